//! Idempotency module
//!
//! Prevents duplicate webhook processing. A gateway event is identified by
//! `(gateway, event_id)`; the processed-event row is inserted as the first
//! statement of the settlement transaction, so it commits or rolls back
//! together with the money movement it guards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique key of a gateway notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookEventKey {
    pub gateway: String,
    pub event_id: String,
}

impl WebhookEventKey {
    /// Gateway names are case-insensitive; event ids are opaque.
    pub fn new(gateway: &str, event_id: &str) -> Self {
        Self {
            gateway: gateway.trim().to_ascii_lowercase(),
            event_id: event_id.trim().to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.gateway.is_empty() && !self.event_id.is_empty()
    }
}

impl std::fmt::Display for WebhookEventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.gateway, self.event_id)
    }
}

/// Row stored for every settled gateway event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedWebhookEvent {
    pub key: WebhookEventKey,
    /// SHA-256 of the raw payload, kept for forensics
    pub payload_hash: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedWebhookEvent {
    pub fn new(key: WebhookEventKey, payload: Option<&[u8]>) -> Self {
        Self {
            key,
            payload_hash: payload.map(payload_fingerprint),
            processed_at: Utc::now(),
        }
    }
}

/// Hex-encoded SHA-256 digest of a payload
pub fn payload_fingerprint(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}
