use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ActivityKind;
use crate::settings::MonitorSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetectorState {
    #[default]
    Idle,
    ConfirmingStart,
    Active,
    ConfirmingStop,
}

impl DetectorState {
    /// The state a confirmation heading towards `target` passes through.
    pub fn confirming(target: ActivityKind) -> Self {
        match target {
            ActivityKind::Started => DetectorState::ConfirmingStart,
            ActivityKind::Stopped => DetectorState::ConfirmingStop,
        }
    }

    /// The state reached once a transition towards `target` is committed.
    pub fn settled(target: ActivityKind) -> Self {
        match target {
            ActivityKind::Started => DetectorState::Active,
            ActivityKind::Stopped => DetectorState::Idle,
        }
    }

    /// The stable state a confirmation towards `target` is trying to leave.
    pub fn origin(target: ActivityKind) -> Self {
        match target {
            ActivityKind::Started => DetectorState::Idle,
            ActivityKind::Stopped => DetectorState::Active,
        }
    }

    pub fn is_confirming(&self) -> bool {
        matches!(
            self,
            DetectorState::ConfirmingStart | DetectorState::ConfirmingStop
        )
    }

    /// Active or about to stop being active.
    pub fn is_engaged(&self) -> bool {
        matches!(self, DetectorState::Active | DetectorState::ConfirmingStop)
    }
}

impl fmt::Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectorState::Idle => "Idle",
            DetectorState::ConfirmingStart => "ConfirmingStart",
            DetectorState::Active => "Active",
            DetectorState::ConfirmingStop => "ConfirmingStop",
        };
        f.write_str(name)
    }
}

/// Threshold and debounce length the machine evaluates against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    pub threshold: f64,
    pub confirmation_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

impl From<&MonitorSettings> for DetectionConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            threshold: settings.threshold,
            confirmation_secs: settings.confirmation_seconds,
        }
    }
}

/// A confirmation that has been started but not yet committed or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub generation: u64,
    pub target: ActivityKind,
}
