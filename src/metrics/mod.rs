mod types;

pub use types::{DeliveryOutcome, DeliveryRecord, MetricsSnapshot};

use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_RECENT_DELIVERIES: usize = 20;

/// Counts webhook delivery outcomes and keeps the most recent records.
pub struct DeliveryMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_deliveries: Vec<DeliveryRecord>,
    delivered_count: u64,
    rejected_count: u64,
    failed_count: u64,
    skipped_dispatch_count: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_deliveries: Vec::with_capacity(MAX_RECENT_DELIVERIES),
                ..MetricsState::default()
            })),
        }
    }

    pub async fn record_delivery(&self, record: DeliveryRecord) {
        let mut state = self.inner.lock().await;

        match record.outcome {
            DeliveryOutcome::Delivered { .. } => state.delivered_count += 1,
            DeliveryOutcome::Rejected { .. } => state.rejected_count += 1,
            DeliveryOutcome::Failed { .. } => state.failed_count += 1,
        }

        state.recent_deliveries.push(record);

        if state.recent_deliveries.len() > MAX_RECENT_DELIVERIES {
            state.recent_deliveries.remove(0);
        }
    }

    pub async fn record_skipped_dispatch(&self) {
        self.inner.lock().await.skipped_dispatch_count += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;

        MetricsSnapshot {
            recent_deliveries: state.recent_deliveries.clone(),
            delivered_count: state.delivered_count,
            rejected_count: state.rejected_count,
            failed_count: state.failed_count,
            skipped_dispatch_count: state.skipped_dispatch_count,
        }
    }
}

impl Default for DeliveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DeliveryMetrics {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
