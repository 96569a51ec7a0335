//! In-memory store
//!
//! Serialising implementation of the storage traits: a transaction holds the
//! single state lock for its whole lifetime and works on a copy that replaces
//! the shared state on commit. Used by tests and local experiments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{SettlementStore, StoreError, StoreResult, StoreTx};
use crate::audit::AuditRecord;
use crate::domain::{
    BalanceDelta, CommissionSources, EntryStatus, LedgerEntry, LedgerEntryType, NewLedgerEntry,
    Order, PayoutStatus, Plan, Subscription, SubscriptionStatus, Supplier, SupplierBalance,
    SupplierFinancialStatus, SupplierStatus, WithdrawalRequest,
};
use crate::idempotency::{ProcessedWebhookEvent, WebhookEventKey};
use crate::outbox::{NewOutboundTask, OutboundStatus, OutboundTask};

/// Everything the store holds
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub suppliers: HashMap<Uuid, Supplier>,
    pub account_default_rates: HashMap<Uuid, Decimal>,
    /// Keyed by (account_id, supplier_id)
    pub commission_overrides: HashMap<(Uuid, Uuid), Decimal>,
    pub plans: HashMap<Uuid, Plan>,
    pub subscriptions: Vec<Subscription>,
    pub orders: HashMap<Uuid, Order>,
    pub ledger: Vec<LedgerEntry>,
    pub processed_events: HashMap<WebhookEventKey, ProcessedWebhookEvent>,
    pub withdrawals: HashMap<Uuid, WithdrawalRequest>,
    pub outbound: Vec<OutboundTask>,
    pub audit: Vec<AuditRecord>,
}

impl MemoryState {
    pub fn ledger_for(&self, supplier_id: Uuid) -> Vec<&LedgerEntry> {
        self.ledger
            .iter()
            .filter(|e| e.supplier_id == supplier_id)
            .collect()
    }

    pub fn entries_for_reference(&self, reference_id: Uuid) -> Vec<&LedgerEntry> {
        self.ledger
            .iter()
            .filter(|e| e.reference_id == reference_id)
            .collect()
    }

    pub fn current_subscription(&self, supplier_id: Uuid) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .rev()
            .find(|s| s.supplier_id == supplier_id && s.status != SubscriptionStatus::Cancelled)
    }

    pub fn outbound_types(&self) -> Vec<&str> {
        self.outbound.iter().map(|t| t.event_type.as_str()).collect()
    }

    pub fn audit_actions(&self) -> Vec<&str> {
        self.audit.iter().map(|a| a.action.as_str()).collect()
    }

    fn supplier_mut(&mut self, supplier_id: Uuid) -> StoreResult<&mut Supplier> {
        self.suppliers
            .get_mut(&supplier_id)
            .ok_or(StoreError::SupplierNotFound(supplier_id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Seeding (collaborator-owned records)
    // =========================================================================

    pub async fn insert_supplier(&self, supplier: Supplier) {
        self.state.lock().await.suppliers.insert(supplier.id, supplier);
    }

    pub async fn insert_plan(&self, plan: Plan) {
        self.state.lock().await.plans.insert(plan.id, plan);
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.state.lock().await.subscriptions.push(subscription);
    }

    pub async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    pub async fn set_account_default_rate(&self, account_id: Uuid, rate: Decimal) {
        self.state
            .lock()
            .await
            .account_default_rates
            .insert(account_id, rate);
    }

    pub async fn set_commission_override(&self, account_id: Uuid, supplier_id: Uuid, rate: Decimal) {
        self.state
            .lock()
            .await
            .commission_overrides
            .insert((account_id, supplier_id), rate);
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make the next commit fail as if the database aborted it
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        })
    }

    async fn supplier(&self, supplier_id: Uuid) -> StoreResult<Option<Supplier>> {
        Ok(self.state.lock().await.suppliers.get(&supplier_id).cloned())
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn withdrawal(&self, request_id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        Ok(self.state.lock().await.withdrawals.get(&request_id).cloned())
    }

    async fn ledger_entries(&self, supplier_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state.ledger_for(supplier_id).into_iter().cloned().collect())
    }

    async fn suppliers_with_due_credits(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state
            .ledger
            .iter()
            .filter(|e| is_due_credit(e, now))
            .map(|e| e.supplier_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state
            .suppliers
            .values()
            .filter(|s| s.is_financially_active())
            .filter(|s| {
                state
                    .current_subscription(s.id)
                    .map(|sub| sub.is_overdue(now))
                    .unwrap_or(false)
            })
            .map(|s| s.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn claim_due_outbound(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: i64,
    ) -> StoreResult<Vec<OutboundTask>> {
        let mut state = self.state.lock().await;
        let mut due: Vec<&mut OutboundTask> = state
            .outbound
            .iter_mut()
            .filter(|t| t.status == OutboundStatus::Pending && t.next_attempt_at <= now)
            .collect();
        due.sort_by_key(|t| t.next_attempt_at);

        let claimed = due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|task| {
                task.next_attempt_at = now + lease;
                task.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn mark_outbound_delivered(&self, task_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(task) = state.outbound.iter_mut().find(|t| t.id == task_id) {
            task.status = OutboundStatus::Delivered;
            task.attempts += 1;
            task.delivered_at = Some(at);
        }
        Ok(())
    }

    async fn mark_outbound_failed(
        &self,
        task_id: Uuid,
        attempts: i32,
        retry_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(task) = state.outbound.iter_mut().find(|t| t.id == task_id) {
            task.attempts = attempts;
            task.last_error = Some(error.to_string());
            match retry_at {
                Some(at) => task.next_attempt_at = at,
                None => task.status = OutboundStatus::Dead,
            }
        }
        Ok(())
    }
}

fn is_due_credit(entry: &LedgerEntry, now: DateTime<Utc>) -> bool {
    entry.entry_type == LedgerEntryType::OrderCreditPending
        && entry.status == EntryStatus::Pending
        && entry.release_date.map(|d| d <= now).unwrap_or(false)
}

/// Open transaction; dropping it discards `working`
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn claim_webhook_event(&mut self, event: &ProcessedWebhookEvent) -> StoreResult<bool> {
        if self.working.processed_events.contains_key(&event.key) {
            return Ok(false);
        }
        self.working
            .processed_events
            .insert(event.key.clone(), event.clone());
        Ok(true)
    }

    async fn lock_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn set_payout_status(&mut self, order_id: Uuid, status: PayoutStatus) -> StoreResult<()> {
        if let Some(order) = self.working.orders.get_mut(&order_id) {
            order.payout_status = Some(status);
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn lock_supplier(&mut self, supplier_id: Uuid) -> StoreResult<Option<Supplier>> {
        Ok(self.working.suppliers.get(&supplier_id).cloned())
    }

    async fn update_supplier_status(
        &mut self,
        supplier_id: Uuid,
        financial_status: SupplierFinancialStatus,
        status: SupplierStatus,
    ) -> StoreResult<()> {
        let supplier = self.working.supplier_mut(supplier_id)?;
        supplier.financial_status = financial_status;
        supplier.status = status;
        Ok(())
    }

    async fn apply_balance_delta(
        &mut self,
        supplier_id: Uuid,
        delta: &BalanceDelta,
    ) -> StoreResult<SupplierBalance> {
        let supplier = self.working.supplier_mut(supplier_id)?;
        let current = supplier.balance;
        let next = current
            .apply(delta)
            .map_err(|bucket| StoreError::NegativeBalance {
                supplier_id,
                bucket,
                current: current.get(bucket),
                change: delta.get(bucket),
            })?;
        supplier.balance = next;
        Ok(next)
    }

    async fn commission_sources(
        &mut self,
        supplier_id: Uuid,
    ) -> StoreResult<Option<CommissionSources>> {
        let state = &self.working;
        let Some(supplier) = state.suppliers.get(&supplier_id) else {
            return Ok(None);
        };

        let plan_rate = state
            .current_subscription(supplier_id)
            .and_then(|sub| state.plans.get(&sub.plan_id))
            .map(|plan| plan.commission_percent);

        Ok(Some(CommissionSources {
            supplier_type: Some(supplier.supplier_type),
            account_override: state
                .commission_overrides
                .get(&(supplier.account_id, supplier_id))
                .copied(),
            supplier_rate: supplier.commission_percent,
            account_default: state.account_default_rates.get(&supplier.account_id).copied(),
            plan_rate,
        }))
    }

    async fn current_subscription(
        &mut self,
        supplier_id: Uuid,
    ) -> StoreResult<Option<Subscription>> {
        Ok(self.working.current_subscription(supplier_id).cloned())
    }

    async fn update_subscription(&mut self, subscription: &Subscription) -> StoreResult<()> {
        match self
            .working
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => self.working.subscriptions.push(subscription.clone()),
        }
        Ok(())
    }

    async fn plan(&mut self, plan_id: Uuid) -> StoreResult<Option<Plan>> {
        Ok(self.working.plans.get(&plan_id).cloned())
    }

    async fn append_ledger_entry(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        // One pending credit per order, as the partial unique index enforces in Postgres
        if entry.entry_type == LedgerEntryType::OrderCreditPending
            && self.working.ledger.iter().any(|e| {
                e.entry_type == LedgerEntryType::OrderCreditPending
                    && e.reference_id == entry.reference_id
            })
        {
            return Err(StoreError::Aborted(format!(
                "duplicate order credit for {}",
                entry.reference_id
            )));
        }

        let stored = entry.into_entry(Utc::now());
        self.working.ledger.push(stored.clone());
        Ok(stored)
    }

    async fn supplier_ledger(&mut self, supplier_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .working
            .ledger_for(supplier_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn lock_order_credit(&mut self, order_id: Uuid) -> StoreResult<Option<LedgerEntry>> {
        Ok(self
            .working
            .ledger
            .iter()
            .find(|e| {
                e.entry_type == LedgerEntryType::OrderCreditPending && e.reference_id == order_id
            })
            .cloned())
    }

    async fn lock_due_credits(
        &mut self,
        supplier_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let mut due: Vec<LedgerEntry> = self
            .working
            .ledger
            .iter()
            .filter(|e| e.supplier_id == supplier_id && is_due_credit(e, now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.release_date);
        Ok(due)
    }

    async fn transition_entry_status(
        &mut self,
        entry_id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
    ) -> StoreResult<bool> {
        match self
            .working
            .ledger
            .iter_mut()
            .find(|e| e.id == entry_id && e.status == from)
        {
            Some(entry) => {
                entry.status = to;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
        self.working.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn lock_withdrawal(&mut self, request_id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        Ok(self.working.withdrawals.get(&request_id).cloned())
    }

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
        self.working.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn enqueue_outbound(&mut self, task: &NewOutboundTask) -> StoreResult<()> {
        self.working.outbound.push(task.clone().into_task(Utc::now()));
        Ok(())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> StoreResult<()> {
        self.working.audit.push(record.clone());
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Aborted("injected commit failure".to_string()));
        }
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
