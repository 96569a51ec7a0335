//! Scheduled Jobs
//!
//! Background loops that drive the time-based parts of settlement: releasing
//! matured credits, suspending overdue suppliers and delivering the outbox.
//! A failing run is logged and retried on the next tick; it never stops the
//! scheduler.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::outbox::OutboxDispatcher;
use crate::settlement::SettlementEngine;
use crate::store::SettlementStore;

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the release sweep (default: 5 minutes)
    pub release_sweep_interval: Duration,
    /// Interval for the overdue sweep (default: 1 hour)
    pub overdue_sweep_interval: Duration,
    /// Interval for outbox delivery (default: 30 seconds)
    pub outbox_dispatch_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            release_sweep_interval: Duration::from_secs(300),
            overdue_sweep_interval: Duration::from_secs(3600),
            outbox_dispatch_interval: Duration::from_secs(30),
        }
    }
}

/// Job Scheduler - runs periodic settlement tasks
pub struct JobScheduler<S: SettlementStore> {
    engine: Arc<SettlementEngine<S>>,
    dispatcher: Arc<OutboxDispatcher<S>>,
    config: JobSchedulerConfig,
}

impl<S: SettlementStore> JobScheduler<S> {
    /// Create a new job scheduler
    pub fn new(engine: Arc<SettlementEngine<S>>, dispatcher: Arc<OutboxDispatcher<S>>) -> Self {
        Self::with_config(engine, dispatcher, JobSchedulerConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        engine: Arc<SettlementEngine<S>>,
        dispatcher: Arc<OutboxDispatcher<S>>,
        config: JobSchedulerConfig,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            config,
        }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            release_every = ?self.config.release_sweep_interval,
            overdue_every = ?self.config.overdue_sweep_interval,
            outbox_every = ?self.config.outbox_dispatch_interval,
            "Job scheduler started"
        );

        let mut release_interval = interval(self.config.release_sweep_interval);
        let mut overdue_interval = interval(self.config.overdue_sweep_interval);
        let mut outbox_interval = interval(self.config.outbox_dispatch_interval);
        for ticker in [&mut release_interval, &mut overdue_interval, &mut outbox_interval] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = release_interval.tick() => {
                    if let Err(e) = self.engine.sweep_releases().await {
                        tracing::error!(error = %e, "Release sweep failed");
                    }
                }
                _ = overdue_interval.tick() => {
                    if let Err(e) = self.engine.sweep_overdue_suppliers().await {
                        tracing::error!(error = %e, "Overdue sweep failed");
                    }
                }
                _ = outbox_interval.tick() => {
                    if let Err(e) = self.dispatcher.dispatch_due().await {
                        tracing::error!(error = %e, "Outbox dispatch failed");
                    }
                }
            }
        }
    }

    /// Run all jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        self.run_all_at(Utc::now()).await
    }

    /// Run all jobs once, evaluating due dates at `now`
    pub async fn run_all_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.engine.sweep_releases_at(now).await {
            Ok(summary) => {
                report.credits_released = summary.released_count;
                report.amount_released = summary.released_amount;
                if summary.failed_suppliers > 0 {
                    report.errors.push(format!(
                        "Release sweep: {} supplier(s) failed",
                        summary.failed_suppliers
                    ));
                }
            }
            Err(e) => report.errors.push(format!("Release sweep: {}", e)),
        }

        match self.engine.sweep_overdue_suppliers_at(now).await {
            Ok(suppliers) => report.suppliers_marked_overdue = suppliers,
            Err(e) => report.errors.push(format!("Overdue sweep: {}", e)),
        }

        match self.dispatcher.dispatch_due_at(now).await {
            Ok(dispatch) => {
                report.outbound_delivered = dispatch.delivered;
                report.outbound_failed = dispatch.retried + dispatch.dead;
            }
            Err(e) => report.errors.push(format!("Outbox dispatch: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running the jobs once
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub credits_released: usize,
    pub amount_released: Decimal,
    pub suppliers_marked_overdue: Vec<Uuid>,
    pub outbound_delivered: usize,
    pub outbound_failed: usize,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

// =========================================================================
// Tests
// =========================================================================
