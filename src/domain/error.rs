//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::balance::BalanceBucket;

/// Business rule violations and domain invariant failures.
///
/// These are raised synchronously by the settlement engine and surfaced to the
/// admin/controller layer verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Order, supplier, withdrawal request, subscription or plan missing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operating on a terminal or wrong-state entity
    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Not enough available balance for a debit
    #[error("Insufficient available balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Supplier is not financially active (overdue, blocked)
    #[error("Supplier {supplier_id} is not financially active")]
    SupplierInactive { supplier_id: Uuid },

    /// Supplier has no active, non-expired subscription
    #[error("Supplier {supplier_id} has no active subscription")]
    NoActiveSubscription { supplier_id: Uuid },

    /// Invalid amount (zero, negative, sub-cent or larger than the order)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed command (empty event id, blank payout destination)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Commission percentage outside 0..=100
    #[error("Invalid commission rate: {0}%")]
    InvalidCommissionRate(Decimal),

    /// A pending or blocked bucket would go negative
    #[error("Balance invariant violated: {bucket} balance would become negative")]
    BalanceInvariant { bucket: BalanceBucket },
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidStateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    /// Check if this is a client error (caller's fault, not retryable)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::BalanceInvariant { .. })
    }
}
