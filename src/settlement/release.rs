//! Scheduled release of matured order credits (pending -> available)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{ReleaseSummary, SettlementEngine, SettlementResult};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{
    BalanceDelta, EntryStatus, LedgerEntryType, NewLedgerEntry, OperationContext, PayoutStatus,
};
use crate::outbox::NewOutboundTask;
use crate::store::{SettlementStore, StoreTx};

/// Credits released for one supplier
struct SupplierRelease {
    count: usize,
    amount: Decimal,
}

impl<S: SettlementStore> SettlementEngine<S> {
    pub async fn sweep_releases(&self) -> SettlementResult<ReleaseSummary> {
        self.sweep_releases_at(Utc::now()).await
    }

    /// Release every PENDING credit with `release_date <= now`.
    ///
    /// One transaction per supplier; a failing supplier is logged and left
    /// for the next sweep without affecting the others.
    pub async fn sweep_releases_at(&self, now: DateTime<Utc>) -> SettlementResult<ReleaseSummary> {
        let suppliers = self.store.suppliers_with_due_credits(now).await?;
        let ctx = OperationContext::scheduler();
        let mut summary = ReleaseSummary::default();

        for supplier_id in suppliers {
            match self.release_supplier(supplier_id, now, &ctx).await {
                Ok(Some(released)) => {
                    summary.released_count += released.count;
                    summary.released_amount += released.amount;
                    summary.suppliers += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        supplier_id = %supplier_id,
                        error = %e,
                        "Failed to release supplier credits"
                    );
                    summary.failed_suppliers += 1;
                }
            }
        }

        if summary.released_count > 0 || summary.failed_suppliers > 0 {
            info!(
                released = summary.released_count,
                amount = %summary.released_amount,
                suppliers = summary.suppliers,
                failed = summary.failed_suppliers,
                "Release sweep finished"
            );
        }

        Ok(summary)
    }

    async fn release_supplier(
        &self,
        supplier_id: Uuid,
        now: DateTime<Utc>,
        ctx: &OperationContext,
    ) -> SettlementResult<Option<SupplierRelease>> {
        let mut tx = self.store.begin().await?;

        let due = tx.lock_due_credits(supplier_id, now).await?;
        let mut released = Vec::with_capacity(due.len());

        for credit in due {
            // Lost to a concurrent refund
            if !tx
                .transition_entry_status(credit.id, EntryStatus::Pending, EntryStatus::Completed)
                .await?
            {
                debug!(entry_id = %credit.id, "Order credit no longer pending, skipped");
                continue;
            }

            tx.append_ledger_entry(
                NewLedgerEntry::completed(
                    supplier_id,
                    LedgerEntryType::BalanceReleased,
                    credit.amount,
                    credit.reference_id,
                )
                .with_description("Order credit released"),
            )
            .await?;
            tx.set_payout_status(credit.reference_id, PayoutStatus::Released)
                .await?;

            released.push((credit.reference_id, credit.amount));
        }

        if released.is_empty() {
            return Ok(None);
        }

        let total: Decimal = released.iter().map(|(_, amount)| *amount).sum();
        let balance = tx
            .apply_balance_delta(supplier_id, &BalanceDelta::release(total))
            .await?;

        let order_ids: Vec<Uuid> = released.iter().map(|(id, _)| *id).collect();

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::BalanceReleased)
                .resource("Supplier", supplier_id)
                .after_state(&balance)
                .changed_fields(&["available", "pending"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "balance.released",
            json!({
                "supplier_id": supplier_id,
                "amount": total,
                "order_ids": order_ids,
                "available": balance.available,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            supplier_id = %supplier_id,
            count = released.len(),
            amount = %total,
            "Supplier credits released"
        );

        Ok(Some(SupplierRelease {
            count: released.len(),
            amount: total,
        }))
    }
}
