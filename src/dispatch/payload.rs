use serde::Serialize;

use crate::models::ActivityEvent;

/// JSON body POSTed to each webhook endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    pub timestamp: String,
    pub detected: bool,
}

impl<'a> WebhookPayload<'a> {
    pub fn from_event(event: &'a ActivityEvent) -> Self {
        let name = Some(event.subject.as_str()).filter(|name| !name.is_empty());
        Self {
            name,
            timestamp: event.timestamp_iso(),
            detected: event.detected,
        }
    }
}
