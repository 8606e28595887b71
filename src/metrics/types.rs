use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How one POST to one endpoint ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DeliveryOutcome {
    /// 2xx response.
    Delivered { status: u16 },
    /// The endpoint answered with a non-2xx status.
    Rejected { status: u16 },
    /// Timeout, connection error or any other transport failure.
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub endpoint: String,
    pub detected: bool,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub recent_deliveries: Vec<DeliveryRecord>,
    pub delivered_count: u64,
    pub rejected_count: u64,
    pub failed_count: u64,
    /// Dispatches skipped because no endpoint was configured.
    pub skipped_dispatch_count: u64,
}

impl MetricsSnapshot {
    pub fn attempt_count(&self) -> u64 {
        self.delivered_count + self.rejected_count + self.failed_count
    }
}
