pub mod detection;
pub mod dispatch;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod sensing;
pub mod settings;
pub mod signal;
pub mod status;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::time::Duration;

pub use detection::{DetectionMachine, DetectorState};
pub use dispatch::{DispatcherConfig, WebhookDispatcher};
pub use metrics::DeliveryMetrics;
pub use models::{ActivityEvent, ActivityKind, Sample};
pub use monitor::{MonitorController, MonitorHandle};
pub use sensing::SensingController;
pub use settings::{MonitorSettings, SettingsStore};
pub use status::{LogStatusSink, StatusMessage, StatusSink};
pub use utils::init_logging;

/// What the command-line host needs to run one monitoring session.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings_path: PathBuf,
    /// Sample source; stdin when `None`.
    pub input: Option<PathBuf>,
    /// Release samples at this rate instead of as fast as they are read.
    pub replay_hz: Option<f64>,
}

impl RunOptions {
    fn pacing(&self) -> Result<Option<Duration>> {
        match self.replay_hz {
            None => Ok(None),
            Some(hz) => {
                ensure!(
                    hz.is_finite() && hz > 0.0,
                    "replay rate must be a positive number, got {hz}"
                );
                Ok(Some(Duration::from_secs_f64(1.0 / hz)))
            }
        }
    }
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open sample input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Run the monitor over one input stream until it ends or Ctrl-C arrives,
/// then drain outstanding webhook deliveries and log a summary.
pub async fn run(options: RunOptions) -> Result<()> {
    info!("Vibration monitor starting up...");

    let pacing = options.pacing()?;
    let store = Arc::new(SettingsStore::new(options.settings_path.clone())?);
    let status: Arc<dyn StatusSink> = Arc::new(LogStatusSink::new());
    let dispatcher = WebhookDispatcher::new(
        DispatcherConfig::default(),
        status.clone(),
        DeliveryMetrics::new(),
    )?;

    let mut monitor = MonitorController::new(dispatcher, status);
    let handle = monitor.start(store.snapshot())?;

    let reader = open_input(options.input.as_deref()).await?;
    let mut sensing = SensingController::new();
    sensing.start_sensing(reader, handle.clone(), store, pacing)?;

    let finished = tokio::select! {
        stats = sensing.wait() => Some(stats),
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!("Failed to listen for Ctrl-C: {err}");
            }
            None
        }
    };
    let sensing_result = match finished {
        Some(stats) => stats,
        None => {
            info!("Interrupted, shutting down");
            sensing.stop_sensing().await
        }
    };

    // Let the monitor drain samples that were queued before shutdown.
    match handle.snapshot().await {
        Ok(snapshot) => info!(
            "Final state {} after {} samples ({} events)",
            snapshot.state, snapshot.samples_processed, snapshot.events_emitted
        ),
        Err(err) => warn!("Could not read final monitor state: {err:#}"),
    }
    monitor.stop().await?;

    let stats = sensing_result?;
    info!(
        "Read {} lines: {} samples, {} commands, {} rejected",
        stats.lines, stats.samples, stats.controls, stats.rejected
    );

    let metrics = monitor.dispatcher().metrics().get_snapshot().await;
    info!(
        "Webhook deliveries: {} attempted, {} delivered, {} rejected, {} failed, {} skipped (no endpoints)",
        metrics.attempt_count(),
        metrics.delivered_count,
        metrics.rejected_count,
        metrics.failed_count,
        metrics.skipped_dispatch_count
    );

    Ok(())
}
