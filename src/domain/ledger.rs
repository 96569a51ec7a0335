//! Ledger entries
//!
//! Append-only record of every money movement. Entries are never deleted and
//! never edited, except for the `status` column of order credits, which flips
//! exactly once (PENDING -> COMPLETED on release, PENDING/COMPLETED -> REVERSED
//! on refund) and doubles as the lock that makes release and reversal
//! mutually exclusive.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SupplierBalance;

/// Semantic type of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    OrderPayment,
    PlatformCommission,
    MarketplaceFee,
    OrderCreditPending,
    BalanceReleased,
    WithdrawalRequestHold,
    WithdrawalPaid,
    WithdrawalRejectedRefund,
    Refund,
    SubscriptionPayment,
    Adjustment,
}

text_enum!(LedgerEntryType {
    OrderPayment => "order_payment",
    PlatformCommission => "platform_commission",
    MarketplaceFee => "marketplace_fee",
    OrderCreditPending => "order_credit_pending",
    BalanceReleased => "balance_released",
    WithdrawalRequestHold => "withdrawal_request_hold",
    WithdrawalPaid => "withdrawal_paid",
    WithdrawalRejectedRefund => "withdrawal_rejected_refund",
    Refund => "refund",
    SubscriptionPayment => "subscription_payment",
    Adjustment => "adjustment",
});

impl LedgerEntryType {
    /// Whether entries of this type move money across the supplier boundary
    /// (change available + pending + blocked), as opposed to moving it
    /// between buckets or merely documenting a step.
    pub fn affects_balance(&self) -> bool {
        !matches!(
            self,
            LedgerEntryType::OrderCreditPending
                | LedgerEntryType::BalanceReleased
                | LedgerEntryType::WithdrawalRequestHold
                | LedgerEntryType::WithdrawalRejectedRefund
        )
    }
}

/// Ledger entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Completed,
    /// Order credit cancelled by a refund
    Reversed,
}

text_enum!(EntryStatus {
    Pending => "pending",
    Completed => "completed",
    Reversed => "reversed",
});

/// Stored ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Signed: credits positive, debits negative
    pub amount: Decimal,
    /// Order or withdrawal request (or subscription) the entry belongs to
    pub reference_id: Uuid,
    pub status: EntryStatus,
    /// Only set on order credits
    pub release_date: Option<DateTime<Utc>>,
    pub affects_balance: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub reference_id: Uuid,
    pub status: EntryStatus,
    pub release_date: Option<DateTime<Utc>>,
    pub affects_balance: bool,
    pub description: Option<String>,
}

impl NewLedgerEntry {
    /// A settled (COMPLETED) movement
    pub fn completed(
        supplier_id: Uuid,
        entry_type: LedgerEntryType,
        amount: Decimal,
        reference_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            supplier_id,
            entry_type,
            amount,
            reference_id,
            status: EntryStatus::Completed,
            release_date: None,
            affects_balance: entry_type.affects_balance(),
            description: None,
        }
    }

    /// Supplier payout held until `release_date`
    pub fn pending_credit(
        supplier_id: Uuid,
        amount: Decimal,
        order_id: Uuid,
        release_date: DateTime<Utc>,
    ) -> Self {
        Self {
            status: EntryStatus::Pending,
            release_date: Some(release_date),
            ..Self::completed(
                supplier_id,
                LedgerEntryType::OrderCreditPending,
                amount,
                order_id,
            )
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Record without touching the supplier's balance (e.g. externally charged fees)
    pub fn informational(mut self) -> Self {
        self.affects_balance = false;
        self
    }

    /// Materialize with a creation timestamp
    pub fn into_entry(self, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            supplier_id: self.supplier_id,
            entry_type: self.entry_type,
            amount: self.amount,
            reference_id: self.reference_id,
            status: self.status,
            release_date: self.release_date,
            affects_balance: self.affects_balance,
            description: self.description,
            created_at,
        }
    }
}

/// Result of checking a supplier's stored balance against its ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub supplier_id: Uuid,
    /// Sum of COMPLETED entries that affect the balance
    pub ledger_total: Decimal,
    /// available + pending + blocked
    pub balance_total: Decimal,
    /// Sum of order credits still PENDING
    pub pending_credit_total: Decimal,
    pub pending_balance: Decimal,
    pub balanced: bool,
}

impl ReconciliationReport {
    /// Recompute the projection from raw entries and compare.
    pub fn compute(
        supplier_id: Uuid,
        entries: &[LedgerEntry],
        balance: &SupplierBalance,
    ) -> Self {
        let ledger_total: Decimal = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Completed && e.affects_balance)
            .map(|e| e.amount)
            .sum();

        let pending_credit_total: Decimal = entries
            .iter()
            .filter(|e| {
                e.entry_type == LedgerEntryType::OrderCreditPending
                    && e.status == EntryStatus::Pending
            })
            .map(|e| e.amount)
            .sum();

        let balance_total = balance.total();

        Self {
            supplier_id,
            ledger_total,
            balance_total,
            pending_credit_total,
            pending_balance: balance.pending,
            balanced: ledger_total == balance_total && pending_credit_total == balance.pending,
        }
    }
}
