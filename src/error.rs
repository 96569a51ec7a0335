//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::settlement::SettlementError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Temporarily unavailable, retry: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Domain(e) => AppError::Domain(e),
            SettlementError::TransactionFailure(msg) => AppError::Unavailable(msg),
            SettlementError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    Some(format!("{} {}", entity, id)),
                ),
                DomainError::InvalidStateTransition { .. } => (
                    StatusCode::CONFLICT,
                    "invalid_state_transition",
                    Some(domain_err.to_string()),
                ),
                DomainError::InsufficientBalance { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "insufficient_balance",
                    Some(domain_err.to_string()),
                ),
                DomainError::SupplierInactive { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "supplier_inactive",
                    Some(domain_err.to_string()),
                ),
                DomainError::NoActiveSubscription { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "no_active_subscription",
                    Some(domain_err.to_string()),
                ),
                DomainError::InvalidAmount(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount", Some(msg.clone()))
                }
                DomainError::InvalidRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
                }
                DomainError::InvalidCommissionRate(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "invalid_commission_rate",
                    Some(domain_err.to_string()),
                ),
                DomainError::BalanceInvariant { bucket } => {
                    tracing::error!(bucket = %bucket, "Balance invariant violated");
                    (StatusCode::INTERNAL_SERVER_ERROR, "balance_invariant", None)
                }
            },

            // 503 Service Unavailable
            AppError::Unavailable(msg) => {
                tracing::warn!("Transaction aborted, client should retry: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "transaction_failure", None)
            }

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
