//! Human-readable status updates and the sinks that receive them.

use std::fmt;

use log::info;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// Window not yet full; detection suppressed.
    Collecting { collected: usize, capacity: usize },
    Idle,
    ConfirmingStart { remaining_secs: u64 },
    Active,
    ConfirmingStop { remaining_secs: u64 },
    Paused,
    Resumed,
    ManuallyStarted,
    ManuallyStopped,
    NoEndpoints,
    Stopped,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Collecting {
                collected,
                capacity,
            } => write!(f, "Status: Collecting samples ({collected}/{capacity})..."),
            StatusMessage::Idle => f.write_str("Status: Idle. Waiting for vibration..."),
            StatusMessage::ConfirmingStart { remaining_secs } => write!(
                f,
                "Status: Vibration detected. Confirming start in {remaining_secs} s..."
            ),
            StatusMessage::Active => f.write_str("Status: Detected."),
            StatusMessage::ConfirmingStop { remaining_secs } => write!(
                f,
                "Status: Low vibration. Confirming stop in {remaining_secs} s..."
            ),
            StatusMessage::Paused => f.write_str("Status: Detection Paused."),
            StatusMessage::Resumed => f.write_str("Status: Detection Resumed."),
            StatusMessage::ManuallyStarted => f.write_str("Status: Manually set to Detected."),
            StatusMessage::ManuallyStopped => f.write_str("Status: Manually set to Idle."),
            StatusMessage::NoEndpoints => f.write_str("Warning: No webhook URLs are set."),
            StatusMessage::Stopped => f.write_str("Service not running."),
        }
    }
}

/// Receives status updates from the monitor. Implementations must not block.
pub trait StatusSink: Send + Sync {
    fn publish(&self, message: &StatusMessage);
}

/// Writes every status change to the log, skipping repeats.
pub struct LogStatusSink {
    last: std::sync::Mutex<Option<StatusMessage>>,
}

impl LogStatusSink {
    pub fn new() -> Self {
        Self {
            last: std::sync::Mutex::new(None),
        }
    }
}

impl Default for LogStatusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for LogStatusSink {
    fn publish(&self, message: &StatusMessage) {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_ref() == Some(message) {
            return;
        }
        info!("{message}");
        *last = Some(message.clone());
    }
}

/// Keeps only the latest status string, for displays that poll or await changes.
pub struct WatchStatusSink {
    tx: watch::Sender<String>,
}

impl WatchStatusSink {
    pub fn new() -> (Self, watch::Receiver<String>) {
        let (tx, rx) = watch::channel(StatusMessage::Stopped.to_string());
        (Self { tx }, rx)
    }
}

impl StatusSink for WatchStatusSink {
    fn publish(&self, message: &StatusMessage) {
        let text = message.to_string();
        self.tx.send_if_modified(|current| {
            if *current == text {
                false
            } else {
                *current = text;
                true
            }
        });
    }
}

/// Records every update in order.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStatusSink {
    messages: std::sync::Mutex<Vec<StatusMessage>>,
}

#[cfg(test)]
impl MemoryStatusSink {
    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, message: &StatusMessage) -> bool {
        self.messages.lock().unwrap().contains(message)
    }
}

#[cfg(test)]
impl StatusSink for MemoryStatusSink {
    fn publish(&self, message: &StatusMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }
}
