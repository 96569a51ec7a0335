//! Outbound sink trait and HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::OutboundTask;

/// Errors that can occur when delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver answered with a non-success status.
    #[error("Endpoint {endpoint} returned {status}")]
    Rejected { endpoint: String, status: u16 },

    /// Sink is not configured/available.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for outbound notifications
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Deliver one task. Receivers must tolerate redelivery of the same task id.
    async fn deliver(&self, task: &OutboundTask) -> Result<(), SinkError>;

    /// Return the sink name for logging.
    fn name(&self) -> &str;
}

/// POSTs each task as JSON to every configured endpoint.
pub struct HttpSink {
    client: Client,
    endpoints: Vec<String>,
}

impl HttpSink {
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl OutboundSink for HttpSink {
    async fn deliver(&self, task: &OutboundTask) -> Result<(), SinkError> {
        if self.endpoints.is_empty() {
            debug!(task_id = %task.id, event_type = %task.event_type, "No forward endpoints configured");
            return Ok(());
        }

        let body = json!({
            "id": task.id,
            "event_type": task.event_type,
            "payload": task.payload,
            "created_at": task.created_at,
        });

        for endpoint in &self.endpoints {
            let response = self
                .client
                .post(endpoint)
                .header("X-Event-Id", task.id.to_string())
                .header("X-Event-Type", task.event_type.as_str())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                warn!(
                    endpoint = %endpoint,
                    status = %status,
                    task_id = %task.id,
                    "Outbound POST rejected"
                );
                return Err(SinkError::Rejected {
                    endpoint: endpoint.clone(),
                    status: status.as_u16(),
                });
            }
        }

        debug!(task_id = %task.id, endpoints = self.endpoints.len(), "Outbound task delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
