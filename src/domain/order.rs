//! Order (financial-facing fields only)
//!
//! Orders are created by order management; `payment_status` and the
//! financial fields are only ever mutated by the settlement engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fulfilment status (owned by order management, except cancellation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

text_enum!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderFinancialStatus {
    AwaitingPayment,
    PaymentFailed,
    Settled,
    Refunded,
}

text_enum!(OrderFinancialStatus {
    AwaitingPayment => "awaiting_payment",
    PaymentFailed => "payment_failed",
    Settled => "settled",
    Refunded => "refunded",
});

/// Where the supplier payout for this order stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Released,
    Reversed,
}

text_enum!(PayoutStatus {
    Pending => "pending",
    Released => "released",
    Reversed => "reversed",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Tenant that placed the order
    pub account_id: Uuid,
    pub supplier_id: Uuid,
    pub total_amount: Decimal,
    /// Fee withheld by the external marketplace, if any
    pub marketplace_fee: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub financial_status: OrderFinancialStatus,
    pub payout_status: Option<PayoutStatus>,
    pub amount_paid: Option<Decimal>,
    pub commission_rate: Option<Decimal>,
    pub commission_value: Option<Decimal>,
    pub net_value: Option<Decimal>,
    pub gateway: Option<String>,
    pub external_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A freshly placed order awaiting payment
    pub fn placed(
        id: Uuid,
        account_id: Uuid,
        supplier_id: Uuid,
        total_amount: Decimal,
        marketplace_fee: Decimal,
    ) -> Self {
        Self {
            id,
            account_id,
            supplier_id,
            total_amount,
            marketplace_fee,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            financial_status: OrderFinancialStatus::AwaitingPayment,
            payout_status: None,
            amount_paid: None,
            commission_rate: None,
            commission_value: None,
            net_value: None,
            gateway: None,
            external_transaction_id: None,
            paid_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            updated_at: Utc::now(),
        }
    }

    /// Payment can still be confirmed (first attempt or retried charge)
    pub fn awaits_payment(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        ) && self.status != OrderStatus::Cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OrderStatus::Cancelled
    }
}
