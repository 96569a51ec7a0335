//! Engine inputs and outcomes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commission::CommissionSource;
use crate::domain::{Amount, BalanceBucket, PaymentStatus};
use crate::idempotency::{payload_fingerprint, WebhookEventKey};

/// Gateway notification that a charge succeeded
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub order_id: Uuid,
    pub event: WebhookEventKey,
    pub external_transaction_id: String,
    pub amount_paid: Amount,
    pub payload_hash: Option<String>,
}

impl ConfirmPayment {
    pub fn new(
        order_id: Uuid,
        gateway: &str,
        external_transaction_id: &str,
        amount_paid: Amount,
        event_id: &str,
    ) -> Self {
        Self {
            order_id,
            event: WebhookEventKey::new(gateway, event_id),
            external_transaction_id: external_transaction_id.to_string(),
            amount_paid,
            payload_hash: None,
        }
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload_hash = Some(payload_fingerprint(payload));
        self
    }
}

/// Gateway notification that a charge failed
#[derive(Debug, Clone)]
pub struct FailPayment {
    pub order_id: Uuid,
    pub event: WebhookEventKey,
    pub reason: Option<String>,
    pub payload_hash: Option<String>,
}

impl FailPayment {
    pub fn new(order_id: Uuid, gateway: &str, event_id: &str, reason: Option<String>) -> Self {
        Self {
            order_id,
            event: WebhookEventKey::new(gateway, event_id),
            reason,
            payload_hash: None,
        }
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload_hash = Some(payload_fingerprint(payload));
        self
    }
}

/// Money movement of a confirmed payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReceipt {
    pub order_id: Uuid,
    pub supplier_id: Uuid,
    pub amount_paid: Decimal,
    pub commission_rate: Decimal,
    pub commission_source: CommissionSource,
    pub marketplace_fee: Decimal,
    pub platform_commission: Decimal,
    pub supplier_payout: Decimal,
    pub release_date: DateTime<Utc>,
}

/// Result of a gateway event. Duplicates are successes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled(SettlementReceipt),
    PaymentFailed { order_id: Uuid },
    /// `(gateway, event_id)` was already processed
    DuplicateEvent,
    /// Order already past the point this event could change
    AlreadySettled {
        order_id: Uuid,
        payment_status: PaymentStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    /// Paid order reversed; the payout was taken back from `bucket`
    Refunded {
        order_id: Uuid,
        reversed_payout: Decimal,
        bucket: BalanceBucket,
    },
    /// Unpaid order cancelled; no money moved
    Cancelled { order_id: Uuid },
    /// Nothing left to reverse
    NoChange { order_id: Uuid },
}

/// Totals of one release sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub released_count: usize,
    pub released_amount: Decimal,
    pub suppliers: usize,
    /// Suppliers whose batch failed and will be retried by the next sweep
    pub failed_suppliers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SubscriptionPaymentMethod {
    /// Debit the supplier's available balance
    Balance,
    /// Charged on the supplier's card by the gateway
    ExternalCharge { charge_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionReceipt {
    pub subscription_id: Uuid,
    pub plan_id: Uuid,
    pub amount: Decimal,
    pub next_billing_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum PlanChange {
    Upgraded { plan_id: Uuid },
    DowngradeScheduled {
        plan_id: Uuid,
        effective_at: DateTime<Utc>,
    },
    Unchanged,
}
