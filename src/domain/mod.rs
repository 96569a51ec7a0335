//! Domain module
//!
//! Core domain types and business logic.

/// Unrecognised value for a status column
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Snake-case string mapping for enums persisted as TEXT columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::domain::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;

pub mod amount;
pub mod balance;
pub mod context;
pub mod error;
pub mod ledger;
pub mod order;
pub mod supplier;
pub mod withdrawal;

pub use amount::{round_money, Amount, AmountError};
pub use balance::{BalanceBucket, BalanceDelta, SupplierBalance};
pub use context::OperationContext;
pub use error::DomainError;
pub use ledger::{
    EntryStatus, LedgerEntry, LedgerEntryType, NewLedgerEntry, ReconciliationReport,
};
pub use order::{Order, OrderFinancialStatus, OrderStatus, PaymentStatus, PayoutStatus};
pub use supplier::{
    CommissionSources, Plan, Subscription, SubscriptionStatus, Supplier,
    SupplierFinancialStatus, SupplierStatus, SupplierType,
};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus};
