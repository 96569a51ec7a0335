//! Supplier balance
//!
//! Three mutually exclusive buckets (available / pending / blocked) stored
//! denormalized on the supplier row. Every mutation is expressed as a
//! relative [`BalanceDelta`] applied by the storage layer, never as a
//! read-then-write of the whole balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

use super::Amount;

/// One of the three balance buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceBucket {
    /// Withdrawable now
    Available,
    /// Awaiting its release date
    Pending,
    /// Reserved for an in-flight withdrawal
    Blocked,
}

impl BalanceBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceBucket::Available => "available",
            BalanceBucket::Pending => "pending",
            BalanceBucket::Blocked => "blocked",
        }
    }
}

impl fmt::Display for BalanceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a supplier's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplierBalance {
    pub available: Decimal,
    pub pending: Decimal,
    pub blocked: Decimal,
}

impl SupplierBalance {
    pub fn new(available: Decimal, pending: Decimal, blocked: Decimal) -> Self {
        Self {
            available,
            pending,
            blocked,
        }
    }

    /// available + pending + blocked
    pub fn total(&self) -> Decimal {
        self.available + self.pending + self.blocked
    }

    pub fn get(&self, bucket: BalanceBucket) -> Decimal {
        match bucket {
            BalanceBucket::Available => self.available,
            BalanceBucket::Pending => self.pending,
            BalanceBucket::Blocked => self.blocked,
        }
    }

    /// Apply a delta, failing with the first bucket that would go negative.
    pub fn apply(&self, delta: &BalanceDelta) -> Result<SupplierBalance, BalanceBucket> {
        let next = SupplierBalance {
            available: self.available + delta.available,
            pending: self.pending + delta.pending,
            blocked: self.blocked + delta.blocked,
        };

        for bucket in [
            BalanceBucket::Available,
            BalanceBucket::Pending,
            BalanceBucket::Blocked,
        ] {
            if next.get(bucket) < Decimal::ZERO {
                return Err(bucket);
            }
        }

        Ok(next)
    }
}

/// Relative change to a supplier's buckets, applied atomically with its
/// ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub available: Decimal,
    pub pending: Decimal,
    pub blocked: Decimal,
}

impl BalanceDelta {
    /// Settled sale payout waiting for its release date
    pub fn credit_pending(amount: Decimal) -> Self {
        Self {
            pending: amount,
            ..Self::default()
        }
    }

    /// Matured credit: pending -> available
    pub fn release(amount: Decimal) -> Self {
        Self {
            available: amount,
            pending: -amount,
            ..Self::default()
        }
    }

    /// Withdrawal request: available -> blocked
    pub fn hold(amount: &Amount) -> Self {
        Self {
            available: amount.negated(),
            blocked: amount.value(),
            ..Self::default()
        }
    }

    /// Rejected withdrawal: blocked -> available
    pub fn return_hold(amount: &Amount) -> Self {
        Self {
            available: amount.value(),
            blocked: amount.negated(),
            ..Self::default()
        }
    }

    /// Paid withdrawal: funds leave the system from the blocked bucket
    pub fn pay_out(amount: &Amount) -> Self {
        Self {
            blocked: amount.negated(),
            ..Self::default()
        }
    }

    /// Debit a single bucket
    pub fn debit(bucket: BalanceBucket, amount: Decimal) -> Self {
        let mut delta = Self::default();
        match bucket {
            BalanceBucket::Available => delta.available = -amount,
            BalanceBucket::Pending => delta.pending = -amount,
            BalanceBucket::Blocked => delta.blocked = -amount,
        }
        delta
    }

    pub fn get(&self, bucket: BalanceBucket) -> Decimal {
        match bucket {
            BalanceBucket::Available => self.available,
            BalanceBucket::Pending => self.pending,
            BalanceBucket::Blocked => self.blocked,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.pending.is_zero() && self.blocked.is_zero()
    }

    /// Net change to the supplier's total balance
    pub fn net(&self) -> Decimal {
        self.available + self.pending + self.blocked
    }
}

impl Add for BalanceDelta {
    type Output = BalanceDelta;

    fn add(self, rhs: Self) -> Self::Output {
        BalanceDelta {
            available: self.available + rhs.available,
            pending: self.pending + rhs.pending,
            blocked: self.blocked + rhs.blocked,
        }
    }
}
