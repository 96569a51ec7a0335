//! Settlement errors
//!
//! What the engine surfaces to callers. Storage failures are folded into
//! business errors where the store refused a guarded balance update.

use crate::domain::{BalanceBucket, DomainError};
use crate::store::StoreError;

pub type SettlementResult<T> = Result<T, SettlementError>;

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The transaction was rolled back by the store; re-running it is safe
    #[error("Transaction failed, safe to retry: {0}")]
    TransactionFailure(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl SettlementError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::TransactionFailure(_))
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            SettlementError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NegativeBalance {
                bucket: BalanceBucket::Available,
                current,
                change,
                ..
            } => DomainError::insufficient_balance(-change, current).into(),
            StoreError::NegativeBalance { bucket, .. } => {
                DomainError::BalanceInvariant { bucket }.into()
            }
            StoreError::SupplierNotFound(id) => DomainError::not_found("Supplier", id).into(),
            e if e.is_retryable() => SettlementError::TransactionFailure(e.to_string()),
            e => SettlementError::Storage(e),
        }
    }
}
