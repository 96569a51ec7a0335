//! Outbox dispatcher
//!
//! Leases due tasks, hands them to the sink and records the outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{OutboundSink, RetryPolicy};
use crate::store::{SettlementStore, StoreResult};

/// How long a claimed task stays invisible to other dispatchers
const DELIVERY_LEASE_SECS: i64 = 120;

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
}

pub struct OutboxDispatcher<S: SettlementStore> {
    store: Arc<S>,
    sink: Arc<dyn OutboundSink>,
    policy: RetryPolicy,
    batch_size: i64,
}

impl<S: SettlementStore> OutboxDispatcher<S> {
    pub fn new(
        store: Arc<S>,
        sink: Arc<dyn OutboundSink>,
        policy: RetryPolicy,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            sink,
            policy,
            batch_size,
        }
    }

    pub async fn dispatch_due(&self) -> StoreResult<DispatchReport> {
        self.dispatch_due_at(Utc::now()).await
    }

    /// Deliver every task due at `now`, up to the batch size
    pub async fn dispatch_due_at(&self, now: DateTime<Utc>) -> StoreResult<DispatchReport> {
        let tasks = self
            .store
            .claim_due_outbound(
                now,
                chrono::Duration::seconds(DELIVERY_LEASE_SECS),
                self.batch_size,
            )
            .await?;

        let mut report = DispatchReport {
            claimed: tasks.len(),
            ..DispatchReport::default()
        };

        for task in tasks {
            match self.sink.deliver(&task).await {
                Ok(()) => {
                    self.store.mark_outbound_delivered(task.id, now).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let attempts = task.attempts + 1;
                    let retry_at = self.policy.next_attempt_at(attempts, now);
                    self.store
                        .mark_outbound_failed(task.id, attempts, retry_at, &e.to_string())
                        .await?;

                    match retry_at {
                        Some(at) => {
                            tracing::warn!(
                                task_id = %task.id,
                                event_type = %task.event_type,
                                sink = self.sink.name(),
                                attempts = attempts,
                                retry_at = %at,
                                error = %e,
                                "Outbound delivery failed, will retry"
                            );
                            report.retried += 1;
                        }
                        None => {
                            tracing::error!(
                                task_id = %task.id,
                                event_type = %task.event_type,
                                sink = self.sink.name(),
                                attempts = attempts,
                                error = %e,
                                "Outbound delivery exhausted retries, task is dead"
                            );
                            report.dead += 1;
                        }
                    }
                }
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                delivered = report.delivered,
                retried = report.retried,
                dead = report.dead,
                "Outbox dispatch pass finished"
            );
        }

        Ok(report)
    }
}
