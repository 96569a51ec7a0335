//! Store Errors
//!
//! Error types for storage operations.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{AmountError, BalanceBucket, UnknownVariant};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Guarded balance update refused
    #[error("Supplier {supplier_id}: {bucket} balance cannot go negative (current {current}, change {change})")]
    NegativeBalance {
        supplier_id: Uuid,
        bucket: BalanceBucket,
        current: Decimal,
        change: Decimal,
    },

    #[error("Supplier not found: {0}")]
    SupplierNotFound(Uuid),

    /// Transaction aborted by the store before commit
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// Row could not be decoded into a domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Serialization failures, deadlocks and connectivity problems: the whole
    /// transaction rolled back and re-running it is safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Aborted(_) => true,
            StoreError::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some("40001") | Some("40P01")
            ),
            StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => true,
            _ => false,
        }
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<AmountError> for StoreError {
    fn from(err: AmountError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
