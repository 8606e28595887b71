use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{header::CONTENT_TYPE, Client};
use tokio::{
    task::{JoinHandle, JoinSet},
    time::Instant,
};

use crate::{
    metrics::{DeliveryMetrics, DeliveryOutcome, DeliveryRecord},
    models::ActivityEvent,
    status::{StatusMessage, StatusSink},
};

use super::payload::WebhookPayload;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything one dispatch produced, one outcome per endpoint in completion order.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub event: ActivityEvent,
    pub outcomes: Vec<(String, DeliveryOutcome)>,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .count()
    }

    pub fn outcome_for(&self, endpoint: &str) -> Option<&DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|(url, _)| url == endpoint)
            .map(|(_, outcome)| outcome)
    }
}

/// Handle to the deliveries spawned for one event. Dropping it does not
/// cancel anything.
pub struct DispatchBatch {
    handle: JoinHandle<DispatchReport>,
}

impl DispatchBatch {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<DispatchReport> {
        self.handle.await.context("dispatch batch task failed to join")
    }
}

/// Fire-and-forget webhook delivery.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    status: Arc<dyn StatusSink>,
    metrics: DeliveryMetrics,
}

impl WebhookDispatcher {
    pub fn new(
        config: DispatcherConfig,
        status: Arc<dyn StatusSink>,
        metrics: DeliveryMetrics,
    ) -> Result<Self> {
        // The read timeout restarts after every successful read, so a slow but
        // steady response is not cut off; a stalled one is.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .context("failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            status,
            metrics,
        })
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }

    /// Spawn one POST per endpoint and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch<I>(&self, event: ActivityEvent, endpoints: I) -> DispatchBatch
    where
        I: IntoIterator<Item = String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().collect();
        let metrics = self.metrics.clone();

        if endpoints.is_empty() {
            log_warn!(
                "No webhook URLs are set; {} event not delivered",
                event.kind().as_str()
            );
            self.status.publish(&StatusMessage::NoEndpoints);
            let handle = tokio::spawn(async move {
                metrics.record_skipped_dispatch().await;
                DispatchReport {
                    event,
                    outcomes: Vec::new(),
                }
            });
            return DispatchBatch { handle };
        }

        let client = self.client.clone();
        let handle = tokio::spawn(async move {
            let body = match serde_json::to_string(&WebhookPayload::from_event(&event)) {
                Ok(body) => body,
                Err(err) => {
                    log_error!("failed to serialize webhook payload: {err}");
                    return DispatchReport {
                        event,
                        outcomes: Vec::new(),
                    };
                }
            };

            let mut deliveries = JoinSet::new();
            for endpoint in endpoints {
                let client = client.clone();
                let body = body.clone();
                let metrics = metrics.clone();
                let detected = event.detected;

                deliveries.spawn(async move {
                    let started = Instant::now();
                    let outcome = post_event(&client, &endpoint, body).await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;

                    match &outcome {
                        DeliveryOutcome::Delivered { status } => {
                            log_info!("Webhook to {endpoint} response code: {status} ({elapsed_ms}ms)")
                        }
                        DeliveryOutcome::Rejected { status } => {
                            log_warn!("Webhook to {endpoint} rejected with status {status} ({elapsed_ms}ms)")
                        }
                        DeliveryOutcome::Failed { reason } => {
                            log_warn!("Error sending webhook to {endpoint}: {reason} ({elapsed_ms}ms)")
                        }
                    }

                    metrics
                        .record_delivery(DeliveryRecord {
                            endpoint: endpoint.clone(),
                            detected,
                            completed_at: Utc::now(),
                            elapsed_ms,
                            outcome: outcome.clone(),
                        })
                        .await;

                    (endpoint, outcome)
                });
            }

            let mut outcomes = Vec::with_capacity(deliveries.len());
            while let Some(joined) = deliveries.join_next().await {
                match joined {
                    Ok(result) => outcomes.push(result),
                    Err(err) => log_error!("webhook delivery task failed: {err}"),
                }
            }

            let report = DispatchReport { event, outcomes };
            log_info!(
                "{} event delivered to {}/{} endpoints",
                report.event.kind().as_str(),
                report.delivered_count(),
                report.outcomes.len()
            );
            report
        });

        DispatchBatch { handle }
    }
}

async fn post_event(client: &Client, endpoint: &str, body: String) -> DeliveryOutcome {
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(body)
        .send()
        .await;

    match response {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                DeliveryOutcome::Delivered {
                    status: status.as_u16(),
                }
            } else {
                DeliveryOutcome::Rejected {
                    status: status.as_u16(),
                }
            }
        }
        Err(err) => DeliveryOutcome::Failed {
            reason: describe_error(&err),
        },
    }
}

fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    };

    #[derive(Debug, Clone, Copy)]
    pub enum Reply {
        Status(u16),
        /// Wait, then answer 200.
        Delayed(Duration),
        /// Read the request and never answer.
        Hang,
    }

    /// Minimal HTTP endpoint; every raw request it receives is forwarded on the channel.
    pub async fn spawn_endpoint(reply: Reply) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let _ = tx.send(request);

                    let status = match reply {
                        Reply::Status(code) => code,
                        Reply::Delayed(delay) => {
                            tokio::time::sleep(delay).await;
                            200
                        }
                        Reply::Hang => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            return;
                        }
                    };
                    let response = format!(
                        "HTTP/1.1 {status} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}/hook"), rx)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Body of a raw HTTP request.
    pub fn body_of(request: &str) -> &str {
        request.split("\r\n\r\n").nth(1).unwrap_or("")
    }
}
