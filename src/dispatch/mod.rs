pub mod payload;
pub mod webhook;

pub use payload::WebhookPayload;
pub use webhook::{DispatchBatch, DispatchReport, DispatcherConfig, WebhookDispatcher};
