//! Refunds and cancellations
//!
//! A refund races the release sweep for the same order credit. Both take the
//! credit row lock first and flip its status with a compare-and-set, so
//! exactly one of them wins and the payout is taken back from whichever
//! bucket currently holds it.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{RefundOutcome, SettlementEngine, SettlementResult};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{
    BalanceBucket, BalanceDelta, DomainError, EntryStatus, LedgerEntryType, NewLedgerEntry,
    OperationContext, OrderFinancialStatus, OrderStatus, PaymentStatus, PayoutStatus,
};
use crate::outbox::NewOutboundTask;
use crate::store::{SettlementStore, StoreError, StoreTx};

impl<S: SettlementStore> SettlementEngine<S> {
    /// Refund a paid order or cancel an unpaid one.
    ///
    /// Calling it again on an already refunded or cancelled order is a no-op.
    pub async fn refund_order(
        &self,
        order_id: Uuid,
        reason: &str,
        ctx: &OperationContext,
    ) -> SettlementResult<RefundOutcome> {
        let mut tx = self.store.begin().await?;

        let mut credit = tx.lock_order_credit(order_id).await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id))?;

        // A confirmation that committed while we waited on the order lock
        // inserted its credit after the first read
        if credit.is_none() && order.payment_status == PaymentStatus::Paid {
            credit = tx.lock_order_credit(order_id).await?;
        }

        let credit_reversed = credit
            .as_ref()
            .map(|c| c.status == EntryStatus::Reversed)
            .unwrap_or(false);
        if order.payment_status == PaymentStatus::Refunded || credit_reversed {
            info!(order_id = %order_id, "Order already refunded");
            return Ok(RefundOutcome::NoChange { order_id });
        }

        let now = Utc::now();

        if order.payment_status != PaymentStatus::Paid {
            if order.is_cancelled() {
                return Ok(RefundOutcome::NoChange { order_id });
            }

            let mut cancelled = order.clone();
            cancelled.status = OrderStatus::Cancelled;
            cancelled.cancelled_at = Some(now);
            cancelled.cancellation_reason = Some(reason.to_string());
            cancelled.updated_at = now;
            tx.update_order(&cancelled).await?;

            tx.append_audit(
                &AuditLogBuilder::new(AuditAction::OrderCancelled)
                    .resource("Order", order_id)
                    .before_state(&order)
                    .after_state(&cancelled)
                    .changed_fields(&["status", "cancelled_at", "cancellation_reason"])
                    .build(ctx),
            )
            .await?;

            tx.commit().await?;

            info!(order_id = %order_id, reason = %reason, "Unpaid order cancelled");
            return Ok(RefundOutcome::Cancelled { order_id });
        }

        let credit = credit.ok_or_else(|| {
            StoreError::Corrupt(format!("paid order {} has no order credit", order_id))
        })?;

        let bucket = match credit.status {
            EntryStatus::Pending => BalanceBucket::Pending,
            _ => BalanceBucket::Available,
        };

        if !tx
            .transition_entry_status(credit.id, credit.status, EntryStatus::Reversed)
            .await?
        {
            // Row lock held: only a broken store lets the status move underneath us
            return Err(StoreError::Aborted(format!(
                "order credit {} changed while locked",
                credit.id
            ))
            .into());
        }

        let payout = credit.amount;
        let balance = tx
            .apply_balance_delta(order.supplier_id, &BalanceDelta::debit(bucket, payout))
            .await?;

        let amount_paid = order.amount_paid.unwrap_or(order.total_amount);
        let commission = order.commission_value.unwrap_or(Decimal::ZERO);

        tx.append_ledger_entry(
            NewLedgerEntry::completed(order.supplier_id, LedgerEntryType::Refund, -amount_paid, order_id)
                .with_description(format!("Refund: {}", reason)),
        )
        .await?;
        tx.append_ledger_entry(
            NewLedgerEntry::completed(order.supplier_id, LedgerEntryType::Refund, commission, order_id)
                .with_description("Platform commission returned"),
        )
        .await?;
        if order.marketplace_fee > Decimal::ZERO {
            tx.append_ledger_entry(
                NewLedgerEntry::completed(
                    order.supplier_id,
                    LedgerEntryType::Refund,
                    order.marketplace_fee,
                    order_id,
                )
                .with_description("Marketplace fee returned"),
            )
            .await?;
        }

        let mut refunded = order.clone();
        refunded.status = OrderStatus::Cancelled;
        refunded.payment_status = PaymentStatus::Refunded;
        refunded.financial_status = OrderFinancialStatus::Refunded;
        refunded.payout_status = Some(PayoutStatus::Reversed);
        refunded.cancelled_at = Some(now);
        refunded.cancellation_reason = Some(reason.to_string());
        refunded.updated_at = now;
        tx.update_order(&refunded).await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::OrderRefunded)
                .resource("Order", order_id)
                .before_state(&order)
                .after_state(&refunded)
                .changed_fields(&[
                    "status",
                    "payment_status",
                    "financial_status",
                    "payout_status",
                ])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "order.refunded",
            json!({
                "order_id": order_id,
                "supplier_id": order.supplier_id,
                "amount": amount_paid,
                "reversed_payout": payout,
                "bucket": bucket,
                "reason": reason,
            }),
        ))
        .await?;

        tx.commit().await?;

        if bucket == BalanceBucket::Available {
            warn!(
                order_id = %order_id,
                supplier_id = %order.supplier_id,
                payout = %payout,
                available = %balance.available,
                "Refund reversed an already released payout"
            );
        }
        info!(
            order_id = %order_id,
            supplier_id = %order.supplier_id,
            payout = %payout,
            bucket = %bucket,
            "Order refunded"
        );

        Ok(RefundOutcome::Refunded {
            order_id,
            reversed_payout: payout,
            bucket,
        })
    }
}
