//! Dropship settlement library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod commission;
pub mod config;
pub mod db;
pub mod domain;
pub mod idempotency;
pub mod jobs;
pub mod outbox;
pub mod settlement;
pub mod store;

mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Amount, AmountError, DomainError, OperationContext, SupplierBalance};
pub use settlement::{SettlementConfig, SettlementEngine, SettlementError};
pub use store::{MemoryStore, PgStore, SettlementStore};
