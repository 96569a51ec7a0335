//! Supplier subscription billing
//!
//! Subscription and plan records are owned by billing; the engine applies
//! payments, plan changes and overdue suspension to them.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    PlanChange, SettlementEngine, SettlementResult, SubscriptionPaymentMethod,
    SubscriptionReceipt,
};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{
    Amount, BalanceBucket, BalanceDelta, DomainError, LedgerEntryType, NewLedgerEntry,
    OperationContext, Plan, SubscriptionStatus, SupplierFinancialStatus, SupplierStatus,
};
use crate::outbox::NewOutboundTask;
use crate::store::{SettlementStore, StoreTx};

impl<S: SettlementStore> SettlementEngine<S> {
    /// Record a subscription payment and advance the billing date.
    ///
    /// A scheduled downgrade takes effect here. An overdue supplier is
    /// reactivated.
    pub async fn pay_subscription(
        &self,
        supplier_id: Uuid,
        amount: Amount,
        method: SubscriptionPaymentMethod,
        ctx: &OperationContext,
    ) -> SettlementResult<SubscriptionReceipt> {
        let mut tx = self.store.begin().await?;

        let subscription = tx
            .current_subscription(supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Subscription", supplier_id))?;
        let supplier = tx
            .lock_supplier(supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Supplier", supplier_id))?;

        let plan_id = subscription
            .scheduled_plan_id
            .unwrap_or(subscription.plan_id);
        let plan = load_plan(&mut tx, plan_id).await?;

        let entry = NewLedgerEntry::completed(
            supplier_id,
            LedgerEntryType::SubscriptionPayment,
            amount.negated(),
            subscription.id,
        );
        let entry = match &method {
            SubscriptionPaymentMethod::Balance => {
                tx.apply_balance_delta(
                    supplier_id,
                    &BalanceDelta::debit(BalanceBucket::Available, amount.value()),
                )
                .await?;
                entry.with_description(format!("{} plan paid from balance", plan.name))
            }
            SubscriptionPaymentMethod::ExternalCharge { charge_id } => entry
                .with_description(format!("{} plan charged externally ({})", plan.name, charge_id))
                .informational(),
        };
        tx.append_ledger_entry(entry).await?;

        let now = Utc::now();
        let mut updated = subscription.clone();
        updated.plan_id = plan.id;
        updated.scheduled_plan_id = None;
        updated.status = SubscriptionStatus::Active;
        updated.next_billing_date = subscription.advanced_billing_date(now, plan.cycle());
        tx.update_subscription(&updated).await?;

        if supplier.financial_status == SupplierFinancialStatus::Overdue {
            tx.update_supplier_status(
                supplier_id,
                SupplierFinancialStatus::Active,
                SupplierStatus::Active,
            )
            .await?;
            info!(supplier_id = %supplier_id, "Overdue supplier reactivated");
        }

        let receipt = SubscriptionReceipt {
            subscription_id: updated.id,
            plan_id: plan.id,
            amount: amount.value(),
            next_billing_date: updated.next_billing_date,
        };

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::SubscriptionPaid)
                .resource("Subscription", updated.id)
                .before_state(&subscription)
                .after_state(&updated)
                .changed_fields(&["plan_id", "scheduled_plan_id", "status", "next_billing_date"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "subscription.paid",
            json!({
                "supplier_id": supplier_id,
                "receipt": receipt,
                "method": method,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            supplier_id = %supplier_id,
            plan = %plan.name,
            amount = %amount,
            next_billing_date = %receipt.next_billing_date,
            "Subscription paid"
        );

        Ok(receipt)
    }

    /// Upgrades apply immediately; downgrades wait for the next billing date.
    pub async fn change_plan(
        &self,
        supplier_id: Uuid,
        plan_id: Uuid,
        ctx: &OperationContext,
    ) -> SettlementResult<PlanChange> {
        let mut tx = self.store.begin().await?;

        let subscription = tx
            .current_subscription(supplier_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Subscription", supplier_id))?;
        let current = load_plan(&mut tx, subscription.plan_id).await?;
        let target = load_plan(&mut tx, plan_id).await?;

        let mut updated = subscription.clone();
        let change = if target.id == current.id {
            if subscription.scheduled_plan_id.is_none() {
                return Ok(PlanChange::Unchanged);
            }
            // Cancels a pending downgrade
            updated.scheduled_plan_id = None;
            PlanChange::Unchanged
        } else if target.is_upgrade_from(&current) {
            updated.plan_id = target.id;
            updated.scheduled_plan_id = None;
            PlanChange::Upgraded { plan_id: target.id }
        } else {
            updated.scheduled_plan_id = Some(target.id);
            PlanChange::DowngradeScheduled {
                plan_id: target.id,
                effective_at: subscription.next_billing_date,
            }
        };

        tx.update_subscription(&updated).await?;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::PlanChanged)
                .resource("Subscription", subscription.id)
                .before_state(&subscription)
                .after_state(&updated)
                .changed_fields(&["plan_id", "scheduled_plan_id"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "subscription.plan_changed",
            json!({
                "supplier_id": supplier_id,
                "from_plan_id": current.id,
                "change": change,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            supplier_id = %supplier_id,
            from = %current.name,
            to = %target.name,
            change = ?change,
            "Subscription plan changed"
        );

        Ok(change)
    }

    pub async fn sweep_overdue_suppliers(&self) -> SettlementResult<Vec<Uuid>> {
        self.sweep_overdue_suppliers_at(Utc::now()).await
    }

    /// Suspend suppliers whose billing date has passed. Returns the ids
    /// actually marked in this run.
    pub async fn sweep_overdue_suppliers_at(
        &self,
        now: DateTime<Utc>,
    ) -> SettlementResult<Vec<Uuid>> {
        let candidates = self.store.overdue_candidates(now).await?;
        let ctx = OperationContext::scheduler();
        let mut marked = Vec::new();

        for supplier_id in candidates {
            match self.mark_overdue(supplier_id, now, &ctx).await {
                Ok(true) => marked.push(supplier_id),
                Ok(false) => {}
                Err(e) => {
                    error!(supplier_id = %supplier_id, error = %e, "Failed to mark supplier overdue");
                }
            }
        }

        if !marked.is_empty() {
            info!(count = marked.len(), "Suppliers marked overdue");
        }

        Ok(marked)
    }

    async fn mark_overdue(
        &self,
        supplier_id: Uuid,
        now: DateTime<Utc>,
        ctx: &OperationContext,
    ) -> SettlementResult<bool> {
        let mut tx = self.store.begin().await?;

        let Some(subscription) = tx.current_subscription(supplier_id).await? else {
            return Ok(false);
        };
        let Some(supplier) = tx.lock_supplier(supplier_id).await? else {
            return Ok(false);
        };

        // Paid or blocked since the candidate list was read
        if !supplier.is_financially_active() || !subscription.is_overdue(now) {
            return Ok(false);
        }

        tx.update_supplier_status(
            supplier_id,
            SupplierFinancialStatus::Overdue,
            SupplierStatus::Paused,
        )
        .await?;

        let mut suspended = subscription.clone();
        suspended.status = SubscriptionStatus::Suspended;
        tx.update_subscription(&suspended).await?;

        let mut after = supplier.clone();
        after.financial_status = SupplierFinancialStatus::Overdue;
        after.status = SupplierStatus::Paused;

        tx.append_audit(
            &AuditLogBuilder::new(AuditAction::SupplierOverdue)
                .resource("Supplier", supplier_id)
                .before_state(&supplier)
                .after_state(&after)
                .changed_fields(&["financial_status", "status"])
                .build(ctx),
        )
        .await?;
        tx.enqueue_outbound(&NewOutboundTask::new(
            "supplier.overdue",
            json!({
                "supplier_id": supplier_id,
                "subscription_id": subscription.id,
                "next_billing_date": subscription.next_billing_date,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            supplier_id = %supplier_id,
            next_billing_date = %subscription.next_billing_date,
            "Supplier marked overdue"
        );
        Ok(true)
    }
}

async fn load_plan<T: StoreTx>(tx: &mut T, plan_id: Uuid) -> SettlementResult<Plan> {
    Ok(tx
        .plan(plan_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Plan", plan_id))?)
}
