//! Storage module
//!
//! The settlement engine talks to storage only through these traits. Every
//! state change happens inside a [`StoreTx`]; dropping a transaction without
//! calling [`StoreTx::commit`] rolls everything back, including the processed
//! webhook event claim.
//!
//! Implementations must provide:
//! - a true uniqueness constraint on `(gateway, event_id)` for
//!   [`StoreTx::claim_webhook_event`]
//! - relative, guarded balance updates in [`StoreTx::apply_balance_delta`]
//!   that refuse to drive any bucket negative
//! - row locks for the `lock_*` reads, held until commit or rollback

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::domain::{
    BalanceDelta, CommissionSources, EntryStatus, LedgerEntry, NewLedgerEntry, Order, Plan,
    PayoutStatus, Subscription, Supplier, SupplierBalance, SupplierFinancialStatus,
    SupplierStatus, WithdrawalRequest,
};
use crate::idempotency::ProcessedWebhookEvent;
use crate::outbox::{NewOutboundTask, OutboundTask};

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryState, MemoryStore};
pub use postgres::PgStore;

/// Handle to the shared relational store
#[async_trait]
pub trait SettlementStore: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open an atomic unit of work
    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn supplier(&self, supplier_id: Uuid) -> StoreResult<Option<Supplier>>;

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

    async fn withdrawal(&self, request_id: Uuid) -> StoreResult<Option<WithdrawalRequest>>;

    /// All entries of a supplier, oldest first
    async fn ledger_entries(&self, supplier_id: Uuid) -> StoreResult<Vec<LedgerEntry>>;

    /// Suppliers owning at least one PENDING order credit with `release_date <= now`
    async fn suppliers_with_due_credits(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;

    /// Financially active suppliers whose subscription billing date has passed
    async fn overdue_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;

    /// Lease up to `limit` due outbound tasks until `now + lease`
    async fn claim_due_outbound(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: i64,
    ) -> StoreResult<Vec<OutboundTask>>;

    async fn mark_outbound_delivered(&self, task_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Record a failed attempt; `retry_at = None` marks the task dead
    async fn mark_outbound_failed(
        &self,
        task_id: Uuid,
        attempts: i32,
        retry_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> StoreResult<()>;
}

/// One atomic transaction against the store
#[async_trait]
pub trait StoreTx: Send {
    /// Insert the processed-event marker. `false` when the unique key already
    /// exists (the event was handled by a committed transaction).
    async fn claim_webhook_event(&mut self, event: &ProcessedWebhookEvent) -> StoreResult<bool>;

    async fn lock_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>>;

    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn set_payout_status(&mut self, order_id: Uuid, status: PayoutStatus)
        -> StoreResult<()>;

    async fn lock_supplier(&mut self, supplier_id: Uuid) -> StoreResult<Option<Supplier>>;

    async fn update_supplier_status(
        &mut self,
        supplier_id: Uuid,
        financial_status: SupplierFinancialStatus,
        status: SupplierStatus,
    ) -> StoreResult<()>;

    /// Relative bucket update; fails with [`StoreError::NegativeBalance`]
    async fn apply_balance_delta(
        &mut self,
        supplier_id: Uuid,
        delta: &BalanceDelta,
    ) -> StoreResult<SupplierBalance>;

    async fn commission_sources(
        &mut self,
        supplier_id: Uuid,
    ) -> StoreResult<Option<CommissionSources>>;

    /// Latest non-cancelled subscription, locked
    async fn current_subscription(&mut self, supplier_id: Uuid)
        -> StoreResult<Option<Subscription>>;

    async fn update_subscription(&mut self, subscription: &Subscription) -> StoreResult<()>;

    async fn plan(&mut self, plan_id: Uuid) -> StoreResult<Option<Plan>>;

    async fn append_ledger_entry(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry>;

    /// All entries of a supplier, oldest first, read inside the transaction
    async fn supplier_ledger(&mut self, supplier_id: Uuid) -> StoreResult<Vec<LedgerEntry>>;

    /// The order's ORDER_CREDIT_PENDING entry, locked
    async fn lock_order_credit(&mut self, order_id: Uuid) -> StoreResult<Option<LedgerEntry>>;

    /// PENDING order credits of a supplier due at `now`, locked; rows locked
    /// by a concurrent sweep are skipped
    async fn lock_due_credits(
        &mut self,
        supplier_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LedgerEntry>>;

    /// Compare-and-set on an entry status; `false` if it was not `from`
    async fn transition_entry_status(
        &mut self,
        entry_id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
    ) -> StoreResult<bool>;

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()>;

    async fn lock_withdrawal(&mut self, request_id: Uuid)
        -> StoreResult<Option<WithdrawalRequest>>;

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()>;

    /// Outbox row, delivered after commit
    async fn enqueue_outbound(&mut self, task: &NewOutboundTask) -> StoreResult<()>;

    async fn append_audit(&mut self, record: &AuditRecord) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}
