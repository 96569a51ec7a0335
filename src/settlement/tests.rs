use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use super::*;
use crate::commission::CommissionSource;
use crate::domain::{
    Amount, BalanceBucket, DomainError, EntryStatus, LedgerEntryType, OperationContext,
    Order, OrderFinancialStatus, PaymentStatus, PayoutStatus, Plan, Subscription,
    SubscriptionStatus, Supplier, SupplierBalance, SupplierFinancialStatus, SupplierStatus,
    SupplierType, WithdrawalStatus,
};
use crate::store::{MemoryStore, SettlementStore};

// =========================================================================
// Fixture
// =========================================================================

struct Fixture {
    store: Arc<MemoryStore>,
    engine: SettlementEngine<MemoryStore>,
    account_id: Uuid,
    supplier_id: Uuid,
    plan: Plan,
}

fn plan(name: &str, priority: i32, price: Decimal, release_days: i64) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price,
        commission_percent: dec!(12),
        release_days,
        cycle_days: 30,
        priority,
    }
}

fn ctx() -> OperationContext {
    OperationContext::new()
        .with_source("test")
        .with_correlation_id(Uuid::new_v4())
}

fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

impl Fixture {
    /// External supplier at a fixed 10% with a current subscription
    async fn new() -> Self {
        Self::build(Some(dec!(10)), Utc::now() + Duration::days(20)).await
    }

    /// No commission, so funding amounts land on the balance unchanged
    async fn zero_commission() -> Self {
        Self::build(Some(dec!(0)), Utc::now() + Duration::days(20)).await
    }

    async fn build(rate: Option<Decimal>, next_billing: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let account_id = Uuid::new_v4();

        let mut supplier = Supplier::new(Uuid::new_v4(), account_id, SupplierType::External);
        supplier.commission_percent = rate;
        let supplier_id = supplier.id;
        store.insert_supplier(supplier).await;

        let plan = plan("Pro", 2, dec!(99.90), 14);
        store.insert_plan(plan.clone()).await;
        store
            .insert_subscription(Subscription::new(supplier_id, plan.id, next_billing))
            .await;

        let engine = SettlementEngine::new(store.clone(), SettlementConfig::default());

        Self {
            store,
            engine,
            account_id,
            supplier_id,
            plan,
        }
    }

    async fn place_order(&self, total: Decimal, fee: Decimal) -> Uuid {
        let order = Order::placed(Uuid::new_v4(), self.account_id, self.supplier_id, total, fee);
        let id = order.id;
        self.store.insert_order(order).await;
        id
    }

    async fn confirm(
        &self,
        order_id: Uuid,
        paid: Decimal,
        event_id: &str,
    ) -> SettlementResult<SettlementOutcome> {
        let cmd = ConfirmPayment::new(order_id, "stripe", "pi_123", amount(paid), event_id);
        self.engine.confirm_order_payment(cmd, &ctx()).await
    }

    /// Place and pay an order, returning the receipt
    async fn settle(&self, total: Decimal) -> (Uuid, SettlementReceipt) {
        let order_id = self.place_order(total, Decimal::ZERO).await;
        let event_id = format!("evt_{}", Uuid::new_v4());
        match self.confirm(order_id, total, &event_id).await.unwrap() {
            SettlementOutcome::Settled(receipt) => (order_id, receipt),
            other => panic!("expected settlement, got {other:?}"),
        }
    }

    /// Settle an order and release it, leaving the payout available
    async fn fund(&self, total: Decimal) -> Uuid {
        let (order_id, _) = self.settle(total).await;
        self.engine
            .sweep_releases_at(Utc::now() + Duration::days(15))
            .await
            .unwrap();
        order_id
    }

    async fn balance(&self) -> SupplierBalance {
        self.engine.supplier_balance(self.supplier_id).await.unwrap()
    }

    async fn order(&self, order_id: Uuid) -> Order {
        self.store.order(order_id).await.unwrap().unwrap()
    }

    async fn assert_reconciled(&self) {
        let report = self.engine.reconcile_supplier(self.supplier_id).await.unwrap();
        assert!(report.balanced, "ledger drifted from balance: {report:?}");
    }
}

// =========================================================================
// Payment confirmation
// =========================================================================

#[tokio::test]
async fn test_confirm_payment_splits_commission_and_credits_pending() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;

    let outcome = fx.confirm(order_id, dec!(200), "evt_1").await.unwrap();
    let SettlementOutcome::Settled(receipt) = outcome else {
        panic!("expected settlement");
    };

    assert_eq!(receipt.platform_commission, dec!(20.00));
    assert_eq!(receipt.supplier_payout, dec!(180.00));
    assert_eq!(receipt.commission_source, CommissionSource::SupplierRate);
    assert_eq!(
        receipt.platform_commission + receipt.supplier_payout,
        receipt.amount_paid - receipt.marketplace_fee
    );
    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(0), dec!(180), dec!(0)));

    let order = fx.order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.financial_status, OrderFinancialStatus::Settled);
    assert_eq!(order.payout_status, Some(PayoutStatus::Pending));
    assert_eq!(order.commission_value, Some(dec!(20)));
    assert_eq!(order.net_value, Some(dec!(180)));
    assert_eq!(order.gateway.as_deref(), Some("stripe"));

    let state = fx.store.snapshot().await;
    let types: Vec<LedgerEntryType> = state
        .entries_for_reference(order_id)
        .iter()
        .map(|e| e.entry_type)
        .collect();
    assert_eq!(
        types,
        vec![
            LedgerEntryType::OrderPayment,
            LedgerEntryType::PlatformCommission,
            LedgerEntryType::OrderCreditPending,
        ]
    );
    assert_eq!(state.outbound_types(), vec!["order.paid"]);
    assert_eq!(state.audit_actions(), vec!["order.payment_confirmed"]);

    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_release_date_follows_plan_window() {
    let fx = Fixture::new().await;
    let before = Utc::now();
    let (_, receipt) = fx.settle(dec!(50)).await;

    assert!(receipt.release_date >= before + Duration::days(fx.plan.release_days));
    assert!(receipt.release_date <= Utc::now() + Duration::days(fx.plan.release_days));
}

#[tokio::test]
async fn test_duplicate_event_is_applied_once() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;

    fx.confirm(order_id, dec!(200), "evt_dup").await.unwrap();
    let second = fx.confirm(order_id, dec!(200), "evt_dup").await.unwrap();

    assert_eq!(second, SettlementOutcome::DuplicateEvent);
    assert_eq!(fx.balance().await.pending, dec!(180));
    let state = fx.store.snapshot().await;
    assert_eq!(state.entries_for_reference(order_id).len(), 3);
    assert_eq!(state.outbound.len(), 1);
}

#[tokio::test]
async fn test_new_event_for_paid_order_changes_nothing() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;
    fx.confirm(order_id, dec!(200), "evt_a").await.unwrap();

    let outcome = fx.confirm(order_id, dec!(200), "evt_b").await.unwrap();

    assert_eq!(
        outcome,
        SettlementOutcome::AlreadySettled {
            order_id,
            payment_status: PaymentStatus::Paid,
        }
    );
    assert_eq!(fx.balance().await.pending, dec!(180));
    let state = fx.store.snapshot().await;
    assert_eq!(state.entries_for_reference(order_id).len(), 3);
    // The rolled back claim leaves no trace
    assert_eq!(state.processed_events.len(), 1);
}

#[tokio::test]
async fn test_marketplace_fee_is_taken_before_commission() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), dec!(20)).await;

    let SettlementOutcome::Settled(receipt) =
        fx.confirm(order_id, dec!(200), "evt_fee").await.unwrap()
    else {
        panic!("expected settlement");
    };

    assert_eq!(receipt.marketplace_fee, dec!(20));
    assert_eq!(receipt.platform_commission, dec!(18));
    assert_eq!(receipt.supplier_payout, dec!(162));
    assert_eq!(fx.balance().await.pending, dec!(162));

    let state = fx.store.snapshot().await;
    assert!(state
        .entries_for_reference(order_id)
        .iter()
        .any(|e| e.entry_type == LedgerEntryType::MarketplaceFee && e.amount == dec!(-20)));
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_commission_resolved_at_confirmation_time() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;

    // Negotiated after the order was placed
    fx.store
        .set_commission_override(fx.account_id, fx.supplier_id, dec!(5))
        .await;

    let SettlementOutcome::Settled(receipt) =
        fx.confirm(order_id, dec!(200), "evt_ovr").await.unwrap()
    else {
        panic!("expected settlement");
    };
    assert_eq!(receipt.commission_source, CommissionSource::AccountOverride);
    assert_eq!(receipt.platform_commission, dec!(10));
    assert_eq!(receipt.supplier_payout, dec!(190));
}

#[tokio::test]
async fn test_plan_rate_applies_without_negotiated_rates() {
    let fx = Fixture::build(None, Utc::now() + Duration::days(20)).await;
    let (_, receipt) = fx.settle(dec!(100)).await;

    assert_eq!(receipt.commission_source, CommissionSource::Plan);
    assert_eq!(receipt.platform_commission, dec!(12));
}

#[tokio::test]
async fn test_internal_supplier_pays_no_commission() {
    let store = Arc::new(MemoryStore::new());
    let supplier = Supplier::new(Uuid::new_v4(), Uuid::new_v4(), SupplierType::Internal);
    let order = Order::placed(
        Uuid::new_v4(),
        supplier.account_id,
        supplier.id,
        dec!(80),
        Decimal::ZERO,
    );
    let order_id = order.id;
    let supplier_id = supplier.id;
    store.insert_supplier(supplier).await;
    store.insert_order(order).await;

    let engine = SettlementEngine::new(store.clone(), SettlementConfig::default());
    let before = Utc::now();
    let cmd = ConfirmPayment::new(order_id, "pagarme", "ch_1", amount(dec!(80)), "evt_int");
    let SettlementOutcome::Settled(receipt) =
        engine.confirm_order_payment(cmd, &ctx()).await.unwrap()
    else {
        panic!("expected settlement");
    };

    assert_eq!(receipt.commission_source, CommissionSource::InternalSupplier);
    assert_eq!(receipt.supplier_payout, dec!(80));
    // No plan: configured default window
    assert!(receipt.release_date >= before + Duration::days(14));
    assert_eq!(
        engine.supplier_balance(supplier_id).await.unwrap().pending,
        dec!(80)
    );
}

#[tokio::test]
async fn test_unknown_order_rolls_back_event_claim() {
    let fx = Fixture::new().await;
    let order_id = Uuid::new_v4();

    let err = fx.confirm(order_id, dec!(200), "evt_early").await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::NotFound { entity: "Order", .. })));

    // The order shows up later; the same event is still processable
    let order = Order::placed(order_id, fx.account_id, fx.supplier_id, dec!(200), Decimal::ZERO);
    fx.store.insert_order(order).await;

    let outcome = fx.confirm(order_id, dec!(200), "evt_early").await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Settled(_)));
}

#[tokio::test]
async fn test_commit_failure_is_retryable_and_redelivery_settles() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;

    fx.store.fail_next_commit();
    let err = fx.confirm(order_id, dec!(200), "evt_retry").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(fx.balance().await, SupplierBalance::default());
    assert!(fx.store.snapshot().await.entries_for_reference(order_id).is_empty());

    let outcome = fx.confirm(order_id, dec!(200), "evt_retry").await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Settled(_)));
    assert_eq!(fx.balance().await.pending, dec!(180));
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_blank_event_id_is_rejected() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(10), Decimal::ZERO).await;

    let err = fx.confirm(order_id, dec!(10), "  ").await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::InvalidRequest(_))));
}

// =========================================================================
// Payment failure
// =========================================================================

#[tokio::test]
async fn test_failed_payment_can_be_confirmed_later() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;

    let cmd = FailPayment::new(order_id, "stripe", "evt_fail", Some("card_declined".to_string()));
    let outcome = fx.engine.fail_order_payment(cmd, &ctx()).await.unwrap();
    assert_eq!(outcome, SettlementOutcome::PaymentFailed { order_id });

    let order = fx.order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.financial_status, OrderFinancialStatus::PaymentFailed);
    assert_eq!(fx.balance().await, SupplierBalance::default());

    let outcome = fx.confirm(order_id, dec!(200), "evt_retry_charge").await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Settled(_)));
}

#[tokio::test]
async fn test_late_failure_after_payment_is_ignored() {
    let fx = Fixture::new().await;
    let (order_id, _) = fx.settle(dec!(200)).await;

    let cmd = FailPayment::new(order_id, "stripe", "evt_late_fail", None);
    let outcome = fx.engine.fail_order_payment(cmd, &ctx()).await.unwrap();

    assert_eq!(
        outcome,
        SettlementOutcome::AlreadySettled {
            order_id,
            payment_status: PaymentStatus::Paid,
        }
    );
    assert_eq!(fx.order(order_id).await.payment_status, PaymentStatus::Paid);
}

// =========================================================================
// Release sweep
// =========================================================================

#[tokio::test]
async fn test_release_sweep_moves_due_credits_once() {
    let fx = Fixture::new().await;
    let (order_id, _) = fx.settle(dec!(200)).await;

    let early = fx.engine.sweep_releases_at(Utc::now()).await.unwrap();
    assert_eq!(early.released_count, 0);

    let later = Utc::now() + Duration::days(15);
    let first = fx.engine.sweep_releases_at(later).await.unwrap();
    assert_eq!(first.released_count, 1);
    assert_eq!(first.released_amount, dec!(180));
    assert_eq!(first.suppliers, 1);

    let second = fx.engine.sweep_releases_at(later).await.unwrap();
    assert_eq!(second, ReleaseSummary::default());

    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(180), dec!(0), dec!(0)));
    assert_eq!(
        fx.order(order_id).await.payout_status,
        Some(PayoutStatus::Released)
    );

    let state = fx.store.snapshot().await;
    let credit = state
        .entries_for_reference(order_id)
        .into_iter()
        .find(|e| e.entry_type == LedgerEntryType::OrderCreditPending)
        .cloned()
        .unwrap();
    assert_eq!(credit.status, EntryStatus::Completed);
    assert_eq!(
        state
            .outbound_types()
            .iter()
            .filter(|t| **t == "balance.released")
            .count(),
        1
    );
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_release_sweep_aggregates_per_supplier() {
    let fx = Fixture::new().await;
    fx.settle(dec!(100)).await;
    fx.settle(dec!(50)).await;

    let summary = fx
        .engine
        .sweep_releases_at(Utc::now() + Duration::days(15))
        .await
        .unwrap();

    assert_eq!(summary.released_count, 2);
    assert_eq!(summary.released_amount, dec!(135));
    assert_eq!(summary.suppliers, 1);
    assert_eq!(fx.balance().await.available, dec!(135));

    let state = fx.store.snapshot().await;
    assert_eq!(
        state
            .audit_actions()
            .iter()
            .filter(|a| **a == "balance.released")
            .count(),
        1
    );
}

// =========================================================================
// Refunds
// =========================================================================

#[tokio::test]
async fn test_refund_of_pending_credit_reduces_pending() {
    let fx = Fixture::new().await;
    let (order_id, _) = fx.settle(dec!(200)).await;

    let outcome = fx
        .engine
        .refund_order(order_id, "customer returned item", &ctx())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RefundOutcome::Refunded {
            order_id,
            reversed_payout: dec!(180),
            bucket: BalanceBucket::Pending,
        }
    );
    assert_eq!(fx.balance().await, SupplierBalance::default());

    let order = fx.order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(order.financial_status, OrderFinancialStatus::Refunded);
    assert_eq!(order.payout_status, Some(PayoutStatus::Reversed));
    assert!(order.is_cancelled());

    // Reversed credits are not released
    let summary = fx
        .engine
        .sweep_releases_at(Utc::now() + Duration::days(15))
        .await
        .unwrap();
    assert_eq!(summary.released_count, 0);

    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_refund_of_released_credit_reduces_available() {
    let fx = Fixture::new().await;
    let order_id = fx.fund(dec!(200)).await;
    assert_eq!(fx.balance().await.available, dec!(180));

    let outcome = fx.engine.refund_order(order_id, "chargeback", &ctx()).await.unwrap();

    assert_eq!(
        outcome,
        RefundOutcome::Refunded {
            order_id,
            reversed_payout: dec!(180),
            bucket: BalanceBucket::Available,
        }
    );
    assert_eq!(fx.balance().await, SupplierBalance::default());
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_refund_twice_is_a_no_op() {
    let fx = Fixture::new().await;
    let (order_id, _) = fx.settle(dec!(200)).await;

    fx.engine.refund_order(order_id, "first", &ctx()).await.unwrap();
    let again = fx.engine.refund_order(order_id, "second", &ctx()).await.unwrap();

    assert_eq!(again, RefundOutcome::NoChange { order_id });
    let state = fx.store.snapshot().await;
    assert_eq!(
        state
            .entries_for_reference(order_id)
            .iter()
            .filter(|e| e.entry_type == LedgerEntryType::Refund)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_refund_of_withdrawn_payout_is_refused() {
    let fx = Fixture::zero_commission().await;
    let order_id = fx.fund(dec!(100)).await;
    fx.engine
        .request_withdrawal(fx.supplier_id, amount(dec!(60)), "pix:supplier", &ctx())
        .await
        .unwrap();

    let err = fx.engine.refund_order(order_id, "late claim", &ctx()).await.unwrap_err();

    assert_eq!(
        err.domain(),
        Some(&DomainError::insufficient_balance(dec!(100), dec!(40)))
    );
    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(40), dec!(0), dec!(60)));
    assert_eq!(fx.order(order_id).await.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_unpaid_order_is_cancelled_without_money_movement() {
    let fx = Fixture::new().await;
    let order_id = fx.place_order(dec!(200), Decimal::ZERO).await;

    let outcome = fx.engine.refund_order(order_id, "out of stock", &ctx()).await.unwrap();
    assert_eq!(outcome, RefundOutcome::Cancelled { order_id });

    let order = fx.order(order_id).await;
    assert!(order.is_cancelled());
    assert_eq!(order.cancellation_reason.as_deref(), Some("out of stock"));
    assert!(fx.store.snapshot().await.ledger.is_empty());

    // A payment arriving for a cancelled order is refused
    let err = fx.confirm(order_id, dec!(200), "evt_after_cancel").await.unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidStateTransition { .. })
    ));
}

// =========================================================================
// Withdrawals
// =========================================================================

#[tokio::test]
async fn test_withdrawal_request_then_paid() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;

    let request = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(50)), "pix:supplier@example.com", &ctx())
        .await
        .unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(50), dec!(0), dec!(50)));

    let admin = Uuid::new_v4();
    let paid = fx
        .engine
        .mark_withdrawal_paid(request.id, admin, &ctx())
        .await
        .unwrap();

    assert_eq!(paid.status, WithdrawalStatus::Paid);
    assert_eq!(paid.processed_by, Some(admin));
    let balance = fx.balance().await;
    assert_eq!(balance.blocked, dec!(0));
    assert_eq!(balance.total(), dec!(50));
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_withdrawal_over_available_changes_nothing() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;
    let before = fx.store.snapshot().await;

    let err = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(150)), "pix:supplier", &ctx())
        .await
        .unwrap_err();

    assert_eq!(
        err.domain(),
        Some(&DomainError::insufficient_balance(dec!(150), dec!(100)))
    );
    let after = fx.store.snapshot().await;
    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(100), dec!(0), dec!(0)));
    assert!(after.withdrawals.is_empty());
    assert_eq!(after.ledger.len(), before.ledger.len());
    assert_eq!(after.outbound.len(), before.outbound.len());
}

#[tokio::test]
async fn test_request_then_reject_restores_available() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;
    let before = fx.balance().await;

    let request = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(40)), "pix:supplier", &ctx())
        .await
        .unwrap();
    let rejected = fx
        .engine
        .reject_withdrawal(request.id, "PIX key mismatch", Uuid::new_v4(), &ctx())
        .await
        .unwrap();

    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(rejected.admin_note.as_deref(), Some("PIX key mismatch"));
    let after = fx.balance().await;
    assert_eq!(after.available, before.available);
    assert_eq!(after.blocked, before.blocked);
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_approved_withdrawal_can_be_paid() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;
    let admin = Uuid::new_v4();

    let request = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(30)), "pix:supplier", &ctx())
        .await
        .unwrap();
    let approved = fx.engine.approve_withdrawal(request.id, admin, &ctx()).await.unwrap();
    assert_eq!(approved.status, WithdrawalStatus::Approved);
    // Approval moves no money
    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(70), dec!(0), dec!(30)));

    fx.engine.mark_withdrawal_paid(request.id, admin, &ctx()).await.unwrap();
    assert_eq!(fx.balance().await, SupplierBalance::new(dec!(70), dec!(0), dec!(0)));

    let actions = fx.store.snapshot().await;
    assert!(actions.audit_actions().contains(&"withdrawal.approved"));
    assert!(actions.outbound_types().contains(&"withdrawal.paid"));
}

#[tokio::test]
async fn test_terminal_withdrawal_refuses_transitions() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;
    let admin = Uuid::new_v4();

    let request = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(50)), "pix:supplier", &ctx())
        .await
        .unwrap();
    fx.engine.mark_withdrawal_paid(request.id, admin, &ctx()).await.unwrap();
    let settled = fx.balance().await;

    for result in [
        fx.engine.approve_withdrawal(request.id, admin, &ctx()).await,
        fx.engine.reject_withdrawal(request.id, "too late", admin, &ctx()).await,
        fx.engine.mark_withdrawal_paid(request.id, admin, &ctx()).await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::InvalidStateTransition { .. })
        ));
    }
    assert_eq!(fx.balance().await, settled);
}

#[tokio::test]
async fn test_withdrawal_preconditions() {
    // Overdue subscription
    let fx = Fixture::build(Some(dec!(0)), Utc::now() - Duration::days(1)).await;
    let err = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(10)), "pix:supplier", &ctx())
        .await
        .unwrap_err();
    assert_eq!(
        err.domain(),
        Some(&DomainError::NoActiveSubscription {
            supplier_id: fx.supplier_id
        })
    );

    // Unknown supplier
    let err = fx
        .engine
        .request_withdrawal(Uuid::new_v4(), amount(dec!(10)), "pix:supplier", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::NotFound { entity: "Supplier", .. })));

    // Blank destination
    let err = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(10)), "   ", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::InvalidRequest(_))));
}

// =========================================================================
// Subscriptions
// =========================================================================

#[tokio::test]
async fn test_overdue_sweep_suspends_supplier_once() {
    let fx = Fixture::build(Some(dec!(10)), Utc::now() - Duration::days(1)).await;

    let marked = fx.engine.sweep_overdue_suppliers_at(Utc::now()).await.unwrap();
    assert_eq!(marked, vec![fx.supplier_id]);

    let supplier = fx.store.supplier(fx.supplier_id).await.unwrap().unwrap();
    assert_eq!(supplier.financial_status, SupplierFinancialStatus::Overdue);
    assert_eq!(supplier.status, SupplierStatus::Paused);
    let state = fx.store.snapshot().await;
    assert_eq!(
        state.current_subscription(fx.supplier_id).unwrap().status,
        SubscriptionStatus::Suspended
    );
    assert_eq!(state.audit_actions(), vec!["supplier.marked_overdue"]);
    assert_eq!(state.outbound_types(), vec!["supplier.overdue"]);

    let again = fx.engine.sweep_overdue_suppliers_at(Utc::now()).await.unwrap();
    assert!(again.is_empty());

    let err = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(10)), "pix:supplier", &ctx())
        .await
        .unwrap_err();
    assert_eq!(
        err.domain(),
        Some(&DomainError::SupplierInactive {
            supplier_id: fx.supplier_id
        })
    );
}

#[tokio::test]
async fn test_current_supplier_is_not_marked_overdue() {
    let fx = Fixture::new().await;
    let marked = fx.engine.sweep_overdue_suppliers_at(Utc::now()).await.unwrap();
    assert!(marked.is_empty());
}

#[tokio::test]
async fn test_subscription_paid_from_balance() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;
    let previous = fx
        .store
        .snapshot()
        .await
        .current_subscription(fx.supplier_id)
        .unwrap()
        .next_billing_date;

    let receipt = fx
        .engine
        .pay_subscription(
            fx.supplier_id,
            amount(dec!(49.90)),
            SubscriptionPaymentMethod::Balance,
            &ctx(),
        )
        .await
        .unwrap();

    assert_eq!(receipt.plan_id, fx.plan.id);
    assert_eq!(receipt.next_billing_date, previous + Duration::days(30));
    assert_eq!(fx.balance().await.available, dec!(50.10));
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_subscription_charged_externally_leaves_balance() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(100)).await;

    fx.engine
        .pay_subscription(
            fx.supplier_id,
            amount(dec!(99.90)),
            SubscriptionPaymentMethod::ExternalCharge {
                charge_id: "ch_42".to_string(),
            },
            &ctx(),
        )
        .await
        .unwrap();

    assert_eq!(fx.balance().await.available, dec!(100));
    let state = fx.store.snapshot().await;
    let entry = state
        .ledger
        .iter()
        .find(|e| e.entry_type == LedgerEntryType::SubscriptionPayment)
        .unwrap();
    assert!(!entry.affects_balance);
    assert_eq!(entry.amount, dec!(-99.90));
    fx.assert_reconciled().await;
}

#[tokio::test]
async fn test_subscription_from_balance_needs_funds() {
    let fx = Fixture::zero_commission().await;
    fx.fund(dec!(20)).await;

    let err = fx
        .engine
        .pay_subscription(
            fx.supplier_id,
            amount(dec!(49.90)),
            SubscriptionPaymentMethod::Balance,
            &ctx(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.domain(),
        Some(DomainError::InsufficientBalance { .. })
    ));
    assert_eq!(fx.balance().await.available, dec!(20));
}

#[tokio::test]
async fn test_payment_reactivates_overdue_supplier() {
    let fx = Fixture::build(Some(dec!(10)), Utc::now() - Duration::days(3)).await;
    fx.engine.sweep_overdue_suppliers_at(Utc::now()).await.unwrap();

    let before = Utc::now();
    let receipt = fx
        .engine
        .pay_subscription(
            fx.supplier_id,
            amount(dec!(99.90)),
            SubscriptionPaymentMethod::ExternalCharge {
                charge_id: "ch_7".to_string(),
            },
            &ctx(),
        )
        .await
        .unwrap();

    // Billing restarts from today, not from the missed date
    assert!(receipt.next_billing_date >= before + Duration::days(30));

    let supplier = fx.store.supplier(fx.supplier_id).await.unwrap().unwrap();
    assert_eq!(supplier.financial_status, SupplierFinancialStatus::Active);
    assert_eq!(supplier.status, SupplierStatus::Active);
    let state = fx.store.snapshot().await;
    assert_eq!(
        state.current_subscription(fx.supplier_id).unwrap().status,
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn test_plan_upgrade_applies_immediately() {
    let fx = Fixture::new().await;
    let enterprise = plan("Enterprise", 3, dec!(199.90), 7);
    fx.store.insert_plan(enterprise.clone()).await;

    let change = fx
        .engine
        .change_plan(fx.supplier_id, enterprise.id, &ctx())
        .await
        .unwrap();

    assert_eq!(change, PlanChange::Upgraded { plan_id: enterprise.id });
    let state = fx.store.snapshot().await;
    let subscription = state.current_subscription(fx.supplier_id).unwrap();
    assert_eq!(subscription.plan_id, enterprise.id);
    assert_eq!(subscription.scheduled_plan_id, None);
}

#[tokio::test]
async fn test_plan_downgrade_waits_for_next_payment() {
    let fx = Fixture::new().await;
    let basic = plan("Basic", 1, dec!(49.90), 30);
    fx.store.insert_plan(basic.clone()).await;
    let next_billing = fx
        .store
        .snapshot()
        .await
        .current_subscription(fx.supplier_id)
        .unwrap()
        .next_billing_date;

    let change = fx.engine.change_plan(fx.supplier_id, basic.id, &ctx()).await.unwrap();
    assert_eq!(
        change,
        PlanChange::DowngradeScheduled {
            plan_id: basic.id,
            effective_at: next_billing,
        }
    );
    let state = fx.store.snapshot().await;
    let subscription = state.current_subscription(fx.supplier_id).unwrap();
    assert_eq!(subscription.plan_id, fx.plan.id);
    assert_eq!(subscription.scheduled_plan_id, Some(basic.id));

    let receipt = fx
        .engine
        .pay_subscription(
            fx.supplier_id,
            amount(dec!(49.90)),
            SubscriptionPaymentMethod::ExternalCharge {
                charge_id: "ch_basic".to_string(),
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.plan_id, basic.id);
    let state = fx.store.snapshot().await;
    let subscription = state.current_subscription(fx.supplier_id).unwrap();
    assert_eq!(subscription.plan_id, basic.id);
    assert_eq!(subscription.scheduled_plan_id, None);
}

#[tokio::test]
async fn test_choosing_current_plan_cancels_scheduled_downgrade() {
    let fx = Fixture::new().await;
    let basic = plan("Basic", 1, dec!(49.90), 30);
    fx.store.insert_plan(basic.clone()).await;

    fx.engine.change_plan(fx.supplier_id, basic.id, &ctx()).await.unwrap();
    let change = fx.engine.change_plan(fx.supplier_id, fx.plan.id, &ctx()).await.unwrap();

    assert_eq!(change, PlanChange::Unchanged);
    let state = fx.store.snapshot().await;
    assert_eq!(
        state.current_subscription(fx.supplier_id).unwrap().scheduled_plan_id,
        None
    );
}

#[tokio::test]
async fn test_change_to_unknown_plan_is_not_found() {
    let fx = Fixture::new().await;
    let err = fx
        .engine
        .change_plan(fx.supplier_id, Uuid::new_v4(), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::NotFound { entity: "Plan", .. })));
}

// =========================================================================
// Reads and reconciliation
// =========================================================================

#[tokio::test]
async fn test_reads_for_unknown_supplier() {
    let fx = Fixture::new().await;
    let unknown = Uuid::new_v4();

    for err in [
        fx.engine.supplier_balance(unknown).await.unwrap_err(),
        fx.engine.ledger_entries(unknown).await.map(|_| ()).unwrap_err(),
        fx.engine.reconcile_supplier(unknown).await.map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err.domain(), Some(DomainError::NotFound { .. })));
    }
}

#[tokio::test]
async fn test_ledger_stays_reconciled_through_a_full_lifecycle() {
    let fx = Fixture::new().await;

    let (refunded, _) = fx.settle(dec!(120)).await;
    fx.settle(dec!(200)).await;
    fx.engine.refund_order(refunded, "damaged", &ctx()).await.unwrap();
    fx.assert_reconciled().await;

    fx.engine
        .sweep_releases_at(Utc::now() + Duration::days(15))
        .await
        .unwrap();
    fx.assert_reconciled().await;

    let request = fx
        .engine
        .request_withdrawal(fx.supplier_id, amount(dec!(100)), "pix:supplier", &ctx())
        .await
        .unwrap();
    fx.assert_reconciled().await;
    fx.engine
        .mark_withdrawal_paid(request.id, Uuid::new_v4(), &ctx())
        .await
        .unwrap();

    fx.engine
        .pay_subscription(
            fx.supplier_id,
            amount(dec!(49.90)),
            SubscriptionPaymentMethod::Balance,
            &ctx(),
        )
        .await
        .unwrap();

    let balance = fx.balance().await;
    assert_eq!(balance, SupplierBalance::new(dec!(30.10), dec!(0), dec!(0)));

    let entries = fx.engine.ledger_entries(fx.supplier_id).await.unwrap();
    assert!(entries.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    fx.assert_reconciled().await;
}

// =========================================================================
// Generated operation sequences
// =========================================================================

mod sequences {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Confirm { cents: i64 },
        Redeliver,
        Refund { pick: usize },
        Sweep { days: i64 },
        RequestWithdrawal { cents: i64 },
        Approve { pick: usize },
        Reject { pick: usize },
        MarkPaid { pick: usize },
        PaySubscription { cents: i64 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (100i64..50_000).prop_map(|cents| Op::Confirm { cents }),
            1 => Just(Op::Redeliver),
            2 => any::<usize>().prop_map(|pick| Op::Refund { pick }),
            2 => (1i64..10).prop_map(|days| Op::Sweep { days }),
            2 => (1i64..40_000).prop_map(|cents| Op::RequestWithdrawal { cents }),
            1 => any::<usize>().prop_map(|pick| Op::Approve { pick }),
            1 => any::<usize>().prop_map(|pick| Op::Reject { pick }),
            1 => any::<usize>().prop_map(|pick| Op::MarkPaid { pick }),
            1 => (1i64..15_000).prop_map(|cents| Op::PaySubscription { cents }),
        ]
    }

    fn money(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn picked(ids: &[Uuid], pick: usize) -> Option<Uuid> {
        if ids.is_empty() {
            None
        } else {
            Some(ids[pick % ids.len()])
        }
    }

    /// Business refusals are expected along a random path; anything else is a bug.
    fn refused_or_ok<T>(result: SettlementResult<T>) -> Result<Option<T>, TestCaseError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(SettlementError::Domain(DomainError::BalanceInvariant { bucket })) => Err(
                TestCaseError::fail(format!("balance invariant hit on {bucket}")),
            ),
            Err(SettlementError::Domain(_)) => Ok(None),
            Err(e) => Err(TestCaseError::fail(format!("unexpected failure: {e}"))),
        }
    }

    async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
        let fx = Fixture::new().await;
        let admin = Uuid::new_v4();
        let mut clock = Utc::now();
        let mut orders: Vec<Uuid> = Vec::new();
        let mut withdrawals: Vec<Uuid> = Vec::new();
        let mut last_event: Option<(Uuid, Decimal, String)> = None;

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Confirm { cents } => {
                    let order_id = fx.place_order(money(cents), Decimal::ZERO).await;
                    let event_id = format!("evt_{step}");
                    let outcome = refused_or_ok(fx.confirm(order_id, money(cents), &event_id).await)?;
                    prop_assert!(matches!(outcome, Some(SettlementOutcome::Settled(_))));
                    orders.push(order_id);
                    last_event = Some((order_id, money(cents), event_id));
                }
                Op::Redeliver => {
                    if let Some((order_id, paid, event_id)) = &last_event {
                        let outcome = refused_or_ok(fx.confirm(*order_id, *paid, event_id).await)?;
                        prop_assert_eq!(outcome, Some(SettlementOutcome::DuplicateEvent));
                    }
                }
                Op::Refund { pick } => {
                    if let Some(order_id) = picked(&orders, pick) {
                        refused_or_ok(fx.engine.refund_order(order_id, "returned", &ctx()).await)?;
                    }
                }
                Op::Sweep { days } => {
                    clock += Duration::days(days);
                    refused_or_ok(fx.engine.sweep_releases_at(clock).await)?;
                }
                Op::RequestWithdrawal { cents } => {
                    let requested = fx
                        .engine
                        .request_withdrawal(fx.supplier_id, amount(money(cents)), "pix:supplier", &ctx())
                        .await;
                    if let Some(request) = refused_or_ok(requested)? {
                        withdrawals.push(request.id);
                    }
                }
                Op::Approve { pick } => {
                    if let Some(id) = picked(&withdrawals, pick) {
                        refused_or_ok(fx.engine.approve_withdrawal(id, admin, &ctx()).await)?;
                    }
                }
                Op::Reject { pick } => {
                    if let Some(id) = picked(&withdrawals, pick) {
                        refused_or_ok(fx.engine.reject_withdrawal(id, "wrong key", admin, &ctx()).await)?;
                    }
                }
                Op::MarkPaid { pick } => {
                    if let Some(id) = picked(&withdrawals, pick) {
                        refused_or_ok(fx.engine.mark_withdrawal_paid(id, admin, &ctx()).await)?;
                    }
                }
                Op::PaySubscription { cents } => {
                    let paid = fx
                        .engine
                        .pay_subscription(
                            fx.supplier_id,
                            amount(money(cents)),
                            SubscriptionPaymentMethod::Balance,
                            &ctx(),
                        )
                        .await;
                    refused_or_ok(paid)?;
                }
            }

            let balance = fx.balance().await;
            prop_assert!(balance.available >= Decimal::ZERO, "step {}: {:?}", step, balance);
            prop_assert!(balance.pending >= Decimal::ZERO, "step {}: {:?}", step, balance);
            prop_assert!(balance.blocked >= Decimal::ZERO, "step {}: {:?}", step, balance);

            let report = fx.engine.reconcile_supplier(fx.supplier_id).await.unwrap();
            prop_assert!(report.balanced, "step {}: {:?}", step, report);
        }

        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Buckets stay non-negative and the ledger reconciles after every step
        #[test]
        fn prop_random_sequences_keep_ledger_reconciled(
            ops in proptest::collection::vec(op_strategy(), 1..40),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(run(ops))?;
        }
    }
}
