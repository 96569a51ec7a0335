//! Outbound notification queue
//!
//! Settlement transactions enqueue notifications as rows in the same
//! transaction that moves the money. A dispatcher delivers them after commit
//! with exponential backoff; delivery never feeds back into financial state.

mod dispatcher;
mod sink;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::text_enum;

pub use dispatcher::{DispatchReport, OutboxDispatcher};
pub use sink::{HttpSink, OutboundSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundStatus {
    Pending,
    Delivered,
    /// Gave up after the maximum number of attempts
    Dead,
}

text_enum!(OutboundStatus {
    Pending => "pending",
    Delivered => "delivered",
    Dead => "dead",
});

/// Notification to enqueue inside a settlement transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboundTask {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboundTask {
    pub fn new(event_type: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            payload,
        }
    }

    /// Materialize as a due, never-attempted task
    pub fn into_task(self, now: DateTime<Utc>) -> OutboundTask {
        OutboundTask {
            id: self.id,
            event_type: self.event_type,
            payload: self.payload,
            status: OutboundStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            delivered_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundTask {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboundStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Backoff schedule for failed deliveries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^(attempts - 1), max)` without jitter
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 30) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// When to try again after `attempts` failures, or `None` once exhausted.
    /// Adds up to 10% random jitter.
    pub fn next_attempt_at(&self, attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempts >= self.max_attempts {
            return None;
        }

        let delay = self.backoff(attempts);
        let jitter_ms = (delay.as_millis() / 10) as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };

        let total = delay + Duration::from_millis(jitter);
        chrono::Duration::from_std(total)
            .ok()
            .map(|d| now + d)
    }
}
