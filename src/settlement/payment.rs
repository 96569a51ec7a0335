//! Payment confirmation and failure
//!
//! Both are gateway events: the processed-event claim is the first write of
//! the transaction, so a redelivered event either sees the committed claim
//! or is rolled back with its duplicate insert.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{
    ConfirmPayment, FailPayment, SettlementEngine, SettlementOutcome, SettlementReceipt,
    SettlementResult,
};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::commission::split;
use crate::domain::{
    BalanceDelta, DomainError, LedgerEntryType, NewLedgerEntry, OperationContext, Order,
    OrderFinancialStatus, PaymentStatus, PayoutStatus,
};
use crate::idempotency::{ProcessedWebhookEvent, WebhookEventKey};
use crate::outbox::NewOutboundTask;
use crate::store::{SettlementStore, StoreTx};

impl<S: SettlementStore> SettlementEngine<S> {
    /// Settle a confirmed gateway payment: PENDING/FAILED -> PAID.
    pub async fn confirm_order_payment(
        &self,
        cmd: ConfirmPayment,
        ctx: &OperationContext,
    ) -> SettlementResult<SettlementOutcome> {
        validate_event(&cmd.event)?;

        let mut tx = self.store.begin().await?;

        let claim = ProcessedWebhookEvent {
            key: cmd.event.clone(),
            payload_hash: cmd.payload_hash.clone(),
            processed_at: Utc::now(),
        };
        if !tx.claim_webhook_event(&claim).await? {
            info!(order_id = %cmd.order_id, event = %cmd.event, "Duplicate payment event ignored");
            return Ok(SettlementOutcome::DuplicateEvent);
        }

        let order = tx
            .lock_order(cmd.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", cmd.order_id))?;

        if order.payment_status == PaymentStatus::Paid {
            // Dropping the transaction releases the claim as well
            info!(order_id = %order.id, event = %cmd.event, "Order already paid, nothing to settle");
            return Ok(SettlementOutcome::AlreadySettled {
                order_id: order.id,
                payment_status: order.payment_status,
            });
        }
        if !order.awaits_payment() {
            return Err(DomainError::invalid_transition(
                "Order",
                current_state(&order),
                PaymentStatus::Paid,
            )
            .into());
        }

        let supplier_id = order.supplier_id;
        let resolved = self
            .commission
            .resolve_rate(&mut tx, supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Supplier", supplier_id))?;

        let amount_paid = cmd.amount_paid.value();
        let split = split(amount_paid, resolved.rate, order.marketplace_fee)?;

        let now = Utc::now();
        let release_date = now + self.release_window(&mut tx, supplier_id).await?;

        // Ledger: boundary lines first, then the held payout
        tx.append_ledger_entry(
            NewLedgerEntry::completed(
                supplier_id,
                LedgerEntryType::OrderPayment,
                amount_paid,
                order.id,
            )
            .with_description(format!(
                "Payment {} via {}",
                cmd.external_transaction_id, cmd.event.gateway
            )),
        )
        .await?;

        tx.append_ledger_entry(
            NewLedgerEntry::completed(
                supplier_id,
                LedgerEntryType::PlatformCommission,
                -split.platform_commission,
                order.id,
            )
            .with_description(format!("Platform commission {}%", resolved.rate)),
        )
        .await?;

        if split.marketplace_fee > Decimal::ZERO {
            tx.append_ledger_entry(NewLedgerEntry::completed(
                supplier_id,
                LedgerEntryType::MarketplaceFee,
                -split.marketplace_fee,
                order.id,
            ))
            .await?;
        }

        tx.append_ledger_entry(NewLedgerEntry::pending_credit(
            supplier_id,
            split.supplier_payout,
            order.id,
            release_date,
        ))
        .await?;

        tx.apply_balance_delta(supplier_id, &BalanceDelta::credit_pending(split.supplier_payout))
            .await?;

        let mut updated = order.clone();
        updated.payment_status = PaymentStatus::Paid;
        updated.financial_status = OrderFinancialStatus::Settled;
        updated.payout_status = Some(PayoutStatus::Pending);
        updated.amount_paid = Some(amount_paid);
        updated.commission_rate = Some(resolved.rate);
        updated.commission_value = Some(split.platform_commission);
        updated.net_value = Some(split.supplier_payout);
        updated.gateway = Some(cmd.event.gateway.clone());
        updated.external_transaction_id = Some(cmd.external_transaction_id.clone());
        updated.paid_at = Some(now);
        updated.updated_at = now;
        tx.update_order(&updated).await?;

        let receipt = SettlementReceipt {
            order_id: order.id,
            supplier_id,
            amount_paid,
            commission_rate: resolved.rate,
            commission_source: resolved.source,
            marketplace_fee: split.marketplace_fee,
            platform_commission: split.platform_commission,
            supplier_payout: split.supplier_payout,
            release_date,
        };

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::PaymentConfirmed)
                .resource("Order", order.id)
                .before_state(&order)
                .after_state(&updated)
                .changed_fields(&[
                    "payment_status",
                    "financial_status",
                    "payout_status",
                    "commission_value",
                    "net_value",
                ])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new("order.paid", json!(&receipt)))
            .await?;

        tx.commit().await?;

        info!(
            order_id = %receipt.order_id,
            supplier_id = %supplier_id,
            amount = %amount_paid,
            commission = %receipt.platform_commission,
            payout = %receipt.supplier_payout,
            release_date = %release_date,
            "Order payment settled"
        );

        Ok(SettlementOutcome::Settled(receipt))
    }

    /// Record a failed charge: PENDING -> FAILED, no money movement.
    pub async fn fail_order_payment(
        &self,
        cmd: FailPayment,
        ctx: &OperationContext,
    ) -> SettlementResult<SettlementOutcome> {
        validate_event(&cmd.event)?;

        let mut tx = self.store.begin().await?;

        let claim = ProcessedWebhookEvent {
            key: cmd.event.clone(),
            payload_hash: cmd.payload_hash.clone(),
            processed_at: Utc::now(),
        };
        if !tx.claim_webhook_event(&claim).await? {
            info!(order_id = %cmd.order_id, event = %cmd.event, "Duplicate payment failure event ignored");
            return Ok(SettlementOutcome::DuplicateEvent);
        }

        let order = tx
            .lock_order(cmd.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", cmd.order_id))?;

        if !order.awaits_payment() {
            // A late failure for a paid, refunded or cancelled order changes nothing
            info!(
                order_id = %order.id,
                payment_status = %order.payment_status,
                "Payment failure ignored for settled order"
            );
            return Ok(SettlementOutcome::AlreadySettled {
                order_id: order.id,
                payment_status: order.payment_status,
            });
        }

        let mut updated = order.clone();
        updated.payment_status = PaymentStatus::Failed;
        updated.financial_status = OrderFinancialStatus::PaymentFailed;
        updated.gateway = Some(cmd.event.gateway.clone());
        updated.updated_at = Utc::now();
        tx.update_order(&updated).await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::PaymentFailed)
                .resource("Order", order.id)
                .before_state(&order)
                .after_state(&updated)
                .changed_fields(&["payment_status", "financial_status"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "order.payment_failed",
            json!({
                "order_id": order.id,
                "supplier_id": order.supplier_id,
                "reason": cmd.reason,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(order_id = %order.id, reason = ?cmd.reason, "Order payment failed");
        Ok(SettlementOutcome::PaymentFailed { order_id: order.id })
    }

    /// D+N window from the supplier's plan, or the configured default
    pub(super) async fn release_window(
        &self,
        tx: &mut S::Tx,
        supplier_id: Uuid,
    ) -> SettlementResult<Duration> {
        if let Some(subscription) = tx.current_subscription(supplier_id).await? {
            if let Some(plan) = tx.plan(subscription.plan_id).await? {
                return Ok(plan.release_window());
            }
        }
        Ok(Duration::days(self.config.default_release_days))
    }
}

fn validate_event(event: &WebhookEventKey) -> SettlementResult<()> {
    if !event.is_valid() {
        return Err(DomainError::InvalidRequest(format!(
            "gateway event key is incomplete: {}",
            event
        ))
        .into());
    }
    Ok(())
}

fn current_state(order: &Order) -> String {
    if order.is_cancelled() {
        order.status.to_string()
    } else {
        order.payment_status.to_string()
    }
}
