//! Settlement Engine
//!
//! Turns order payments into supplier money and moves it through the
//! pending / available / blocked buckets. Every operation runs in a single
//! store transaction that writes ledger entries, applies one relative
//! balance delta, updates entity status, records an audit row and enqueues
//! outbound notifications. Nothing is visible until commit.
//!
//! Locking order inside a transaction is: webhook claim, order credit entry,
//! order, subscription, supplier balance. Sweeps follow the same order.

mod commands;
mod error;
mod payment;
mod refund;
mod release;
mod subscription;
mod withdrawal;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use uuid::Uuid;

use crate::commission::CommissionResolver;
use crate::domain::{DomainError, LedgerEntry, ReconciliationReport, SupplierBalance};
use crate::store::{SettlementStore, StoreTx};

pub use commands::{
    ConfirmPayment, FailPayment, PlanChange, RefundOutcome, ReleaseSummary, SettlementOutcome,
    SettlementReceipt, SubscriptionPaymentMethod, SubscriptionReceipt,
};
pub use error::{SettlementError, SettlementResult};

/// Engine tunables
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Release window for suppliers without a plan
    pub default_release_days: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            default_release_days: 14,
        }
    }
}

pub struct SettlementEngine<S: SettlementStore> {
    store: Arc<S>,
    config: SettlementConfig,
    commission: CommissionResolver,
}

impl<S: SettlementStore> SettlementEngine<S> {
    pub fn new(store: Arc<S>, config: SettlementConfig) -> Self {
        Self {
            store,
            config,
            commission: CommissionResolver,
        }
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    pub async fn supplier_balance(&self, supplier_id: Uuid) -> SettlementResult<SupplierBalance> {
        let supplier = self
            .store
            .supplier(supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Supplier", supplier_id))?;
        Ok(supplier.balance)
    }

    /// Chronological ledger of a supplier
    pub async fn ledger_entries(&self, supplier_id: Uuid) -> SettlementResult<Vec<LedgerEntry>> {
        if self.store.supplier(supplier_id).await?.is_none() {
            return Err(DomainError::not_found("Supplier", supplier_id).into());
        }
        Ok(self.store.ledger_entries(supplier_id).await?)
    }

    /// Recompute the balance projection from the ledger and compare
    pub async fn reconcile_supplier(
        &self,
        supplier_id: Uuid,
    ) -> SettlementResult<ReconciliationReport> {
        // Supplier row lock keeps balance-changing transactions out while reading
        let mut tx = self.store.begin().await?;
        let supplier = tx
            .lock_supplier(supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Supplier", supplier_id))?;
        let entries = tx.supplier_ledger(supplier_id).await?;
        drop(tx);

        let report = ReconciliationReport::compute(supplier_id, &entries, &supplier.balance);

        if !report.balanced {
            tracing::error!(
                supplier_id = %supplier_id,
                ledger_total = %report.ledger_total,
                balance_total = %report.balance_total,
                pending_credit_total = %report.pending_credit_total,
                pending_balance = %report.pending_balance,
                "Supplier balance does not reconcile with ledger"
            );
        }

        Ok(report)
    }
}
