use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{
    detection::DetectorState,
    models::{ActivityKind, Sample},
    settings::MonitorSettings,
};

/// Everything the monitor task reacts to. Samples, operator controls and
/// countdown messages share this one queue so detector state is only ever
/// touched from a single place.
#[derive(Debug)]
pub enum MonitorCommand {
    Sample(Sample),
    Batch(Vec<Sample>),
    Pause,
    Resume,
    TogglePause,
    Override(ActivityKind),
    ToggleOverride,
    Reload(Arc<MonitorSettings>),
    ConfirmationTick { generation: u64, remaining_secs: u64 },
    ConfirmationElapsed { generation: u64 },
    Snapshot(oneshot::Sender<MonitorSnapshot>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub state: DetectorState,
    pub paused: bool,
    pub rms: f64,
    pub window_len: usize,
    pub window_size: usize,
    pub pending_generation: Option<u64>,
    pub samples_processed: u64,
    pub events_emitted: u64,
}
