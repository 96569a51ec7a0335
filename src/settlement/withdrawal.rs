//! Withdrawal lifecycle
//!
//! Requesting moves money available -> blocked. Paying takes it out of the
//! blocked bucket; rejecting returns it to available. Approval is a status
//! change only.

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{SettlementEngine, SettlementResult};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{
    Amount, BalanceDelta, DomainError, LedgerEntryType, NewLedgerEntry, OperationContext,
    WithdrawalRequest, WithdrawalStatus,
};
use crate::outbox::NewOutboundTask;
use crate::store::{SettlementStore, StoreTx};

impl<S: SettlementStore> SettlementEngine<S> {
    /// Reserve `amount` of the available balance for a payout.
    pub async fn request_withdrawal(
        &self,
        supplier_id: Uuid,
        amount: Amount,
        payout_destination: &str,
        ctx: &OperationContext,
    ) -> SettlementResult<WithdrawalRequest> {
        let destination = payout_destination.trim();
        if destination.is_empty() {
            return Err(DomainError::InvalidRequest(
                "payout destination is required".to_string(),
            )
            .into());
        }

        let mut tx = self.store.begin().await?;

        // Subscription row before supplier row, like every other path
        let subscription = tx.current_subscription(supplier_id).await?;
        let supplier = tx
            .lock_supplier(supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Supplier", supplier_id))?;

        if !supplier.is_financially_active() {
            return Err(DomainError::SupplierInactive { supplier_id }.into());
        }

        let now = Utc::now();
        if !subscription.map(|s| s.is_current(now)).unwrap_or(false) {
            return Err(DomainError::NoActiveSubscription { supplier_id }.into());
        }

        let balance = tx
            .apply_balance_delta(supplier_id, &BalanceDelta::hold(&amount))
            .await?;

        let request = WithdrawalRequest::new(supplier_id, amount, destination.to_string());
        tx.insert_withdrawal(&request).await?;

        tx.append_ledger_entry(
            NewLedgerEntry::completed(
                supplier_id,
                LedgerEntryType::WithdrawalRequestHold,
                amount.negated(),
                request.id,
            )
            .with_description("Withdrawal requested"),
        )
        .await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::WithdrawalRequested)
                .resource("WithdrawalRequest", request.id)
                .after_state(&request)
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "withdrawal.requested",
            json!({
                "withdrawal_id": request.id,
                "supplier_id": supplier_id,
                "amount": amount,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = %request.id,
            supplier_id = %supplier_id,
            amount = %amount,
            available = %balance.available,
            blocked = %balance.blocked,
            "Withdrawal requested"
        );

        Ok(request)
    }

    /// PENDING -> APPROVED. No money moves.
    pub async fn approve_withdrawal(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        ctx: &OperationContext,
    ) -> SettlementResult<WithdrawalRequest> {
        let mut tx = self.store.begin().await?;

        let request = lock_request(&mut tx, request_id).await?;
        let approved = request.transition(WithdrawalStatus::Approved, admin_id, None)?;
        tx.update_withdrawal(&approved).await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::WithdrawalApproved)
                .resource("WithdrawalRequest", request_id)
                .before_state(&request)
                .after_state(&approved)
                .changed_fields(&["status", "processed_by", "processed_at"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "withdrawal.approved",
            json!({
                "withdrawal_id": request_id,
                "supplier_id": request.supplier_id,
                "amount": request.amount,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(withdrawal_id = %request_id, admin_id = %admin_id, "Withdrawal approved");
        Ok(approved)
    }

    /// PENDING/APPROVED -> PAID: the blocked funds leave the platform.
    pub async fn mark_withdrawal_paid(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        ctx: &OperationContext,
    ) -> SettlementResult<WithdrawalRequest> {
        let mut tx = self.store.begin().await?;

        let request = lock_request(&mut tx, request_id).await?;
        let paid = request.transition(WithdrawalStatus::Paid, admin_id, None)?;

        tx.apply_balance_delta(request.supplier_id, &BalanceDelta::pay_out(&request.amount))
            .await?;
        tx.append_ledger_entry(
            NewLedgerEntry::completed(
                request.supplier_id,
                LedgerEntryType::WithdrawalPaid,
                request.amount.negated(),
                request_id,
            )
            .with_description(format!("Paid to {}", request.payout_destination)),
        )
        .await?;
        tx.update_withdrawal(&paid).await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::WithdrawalPaid)
                .resource("WithdrawalRequest", request_id)
                .before_state(&request)
                .after_state(&paid)
                .changed_fields(&["status", "processed_by", "processed_at"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "withdrawal.paid",
            json!({
                "withdrawal_id": request_id,
                "supplier_id": request.supplier_id,
                "amount": request.amount,
                "payout_destination": request.payout_destination,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = %request_id,
            supplier_id = %request.supplier_id,
            amount = %request.amount,
            "Withdrawal paid"
        );
        Ok(paid)
    }

    /// PENDING/APPROVED -> REJECTED: the blocked funds return to available.
    pub async fn reject_withdrawal(
        &self,
        request_id: Uuid,
        reason: &str,
        admin_id: Uuid,
        ctx: &OperationContext,
    ) -> SettlementResult<WithdrawalRequest> {
        let mut tx = self.store.begin().await?;

        let request = lock_request(&mut tx, request_id).await?;
        let rejected =
            request.transition(WithdrawalStatus::Rejected, admin_id, Some(reason.to_string()))?;

        tx.apply_balance_delta(
            request.supplier_id,
            &BalanceDelta::return_hold(&request.amount),
        )
        .await?;
        tx.append_ledger_entry(
            NewLedgerEntry::completed(
                request.supplier_id,
                LedgerEntryType::WithdrawalRejectedRefund,
                request.amount.value(),
                request_id,
            )
            .with_description(format!("Withdrawal rejected: {}", reason)),
        )
        .await?;
        tx.update_withdrawal(&rejected).await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::WithdrawalRejected)
                .resource("WithdrawalRequest", request_id)
                .before_state(&request)
                .after_state(&rejected)
                .changed_fields(&["status", "processed_by", "processed_at", "admin_note"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "withdrawal.rejected",
            json!({
                "withdrawal_id": request_id,
                "supplier_id": request.supplier_id,
                "amount": request.amount,
                "reason": reason,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = %request_id,
            supplier_id = %request.supplier_id,
            reason = %reason,
            "Withdrawal rejected"
        );
        Ok(rejected)
    }
}

async fn lock_request<T: StoreTx>(tx: &mut T, request_id: Uuid) -> SettlementResult<WithdrawalRequest> {
    Ok(tx
        .lock_withdrawal(request_id)
        .await?
        .ok_or_else(|| DomainError::not_found("WithdrawalRequest", request_id))?)
}
