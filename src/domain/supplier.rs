//! Suppliers, plans and subscriptions
//!
//! Plan and subscription records belong to the billing collaborator; the
//! engine reads them for commission and release scheduling and only touches
//! status, plan and billing-date fields.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SupplierBalance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierType {
    /// Operated by the tenant itself; never charged commission
    Internal,
    External,
}

text_enum!(SupplierType {
    Internal => "internal",
    External => "external",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierFinancialStatus {
    Active,
    Overdue,
    Blocked,
}

text_enum!(SupplierFinancialStatus {
    Active => "active",
    Overdue => "overdue",
    Blocked => "blocked",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierStatus {
    Active,
    Paused,
    Inactive,
}

text_enum!(SupplierStatus {
    Active => "active",
    Paused => "paused",
    Inactive => "inactive",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: Uuid,
    /// Owning tenant account
    pub account_id: Uuid,
    pub supplier_type: SupplierType,
    pub financial_status: SupplierFinancialStatus,
    pub status: SupplierStatus,
    /// Supplier-level fixed commission, if negotiated
    pub commission_percent: Option<Decimal>,
    pub balance: SupplierBalance,
}

impl Supplier {
    pub fn new(id: Uuid, account_id: Uuid, supplier_type: SupplierType) -> Self {
        Self {
            id,
            account_id,
            supplier_type,
            financial_status: SupplierFinancialStatus::Active,
            status: SupplierStatus::Active,
            commission_percent: None,
            balance: SupplierBalance::default(),
        }
    }

    pub fn is_financially_active(&self) -> bool {
        self.financial_status == SupplierFinancialStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub commission_percent: Decimal,
    /// D+N release window for sale payouts
    pub release_days: i64,
    /// Billing cycle length
    pub cycle_days: i64,
    pub priority: i32,
}

impl Plan {
    /// Higher priority wins; price breaks ties.
    pub fn is_upgrade_from(&self, current: &Plan) -> bool {
        (self.priority, self.price) > (current.priority, current.price)
    }

    pub fn release_window(&self) -> Duration {
        Duration::days(self.release_days)
    }

    pub fn cycle(&self) -> Duration {
        Duration::days(self.cycle_days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
}

text_enum!(SubscriptionStatus {
    Active => "active",
    Suspended => "suspended",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub plan_id: Uuid,
    /// Downgrade waiting for the next billing cycle
    pub scheduled_plan_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub next_billing_date: DateTime<Utc>,
}

impl Subscription {
    pub fn new(supplier_id: Uuid, plan_id: Uuid, next_billing_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            supplier_id,
            plan_id,
            scheduled_plan_id: None,
            status: SubscriptionStatus::Active,
            next_billing_date,
        }
    }

    /// Active and paid up at `now`
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.next_billing_date >= now
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.next_billing_date < now
    }

    /// Next billing date after a successful payment at `now`
    pub fn advanced_billing_date(&self, now: DateTime<Utc>, cycle: Duration) -> DateTime<Utc> {
        self.next_billing_date.max(now) + cycle
    }
}

/// Everything the commission resolver consults, loaded in one read
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommissionSources {
    pub supplier_type: Option<SupplierType>,
    /// Per-account override for this supplier
    pub account_override: Option<Decimal>,
    pub supplier_rate: Option<Decimal>,
    pub account_default: Option<Decimal>,
    pub plan_rate: Option<Decimal>,
}
