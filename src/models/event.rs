use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Which way a confirmed transition went.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Started,
    Stopped,
}

impl ActivityKind {
    pub fn detected(self) -> bool {
        matches!(self, ActivityKind::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Started => "Started",
            ActivityKind::Stopped => "Stopped",
        }
    }
}

/// A confirmed activity transition, created once and handed to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub detected: bool,
}

impl ActivityEvent {
    pub fn new(subject: impl Into<String>, kind: ActivityKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            timestamp,
            detected: kind.detected(),
        }
    }

    pub fn kind(&self) -> ActivityKind {
        if self.detected {
            ActivityKind::Started
        } else {
            ActivityKind::Stopped
        }
    }

    /// ISO-8601 UTC with second precision, e.g. `2024-05-01T10:15:00Z`.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
