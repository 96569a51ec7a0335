//! API Routes
//!
//! HTTP endpoint definitions. Handlers only parse input and map errors; every
//! rule lives in the settlement engine.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Amount, LedgerEntry, OperationContext, ReconciliationReport, WithdrawalRequest,
};
use crate::error::AppError;
use crate::settlement::{
    ConfirmPayment, FailPayment, PlanChange, RefundOutcome, ReleaseSummary, SettlementEngine,
    SettlementOutcome, SubscriptionPaymentMethod, SubscriptionReceipt,
};
use crate::store::SettlementStore;

/// Shared handler state
pub struct AppState<S: SettlementStore> {
    pub engine: Arc<SettlementEngine<S>>,
}

impl<S: SettlementStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventStatus {
    Paid,
    Failed,
}

/// Normalized gateway notification
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub event_id: String,
    pub order_id: Uuid,
    pub status: PaymentEventStatus,
    #[serde(default)]
    pub external_transaction_id: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub supplier_id: Uuid,
    pub available: Decimal,
    pub pending: Decimal,
    pub blocked: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub supplier_id: Uuid,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalCreateRequest {
    pub amount: String,
    pub payout_destination: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub admin_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RejectWithdrawalRequest {
    pub admin_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionPaymentRequest {
    pub amount: String,
    #[serde(flatten)]
    pub method: SubscriptionPaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct OverdueSweepResponse {
    pub suppliers: Vec<Uuid>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S: SettlementStore>() -> Router<AppState<S>> {
    Router::new()
        // Gateway callbacks
        .route("/webhooks/payments/:gateway", post(payment_webhook::<S>))
        // Orders
        .route("/orders/:order_id/refund", post(refund_order::<S>))
        // Supplier reads
        .route("/suppliers/:supplier_id/balance", get(get_balance::<S>))
        .route("/suppliers/:supplier_id/ledger", get(get_ledger::<S>))
        .route(
            "/suppliers/:supplier_id/reconciliation",
            get(get_reconciliation::<S>),
        )
        // Withdrawals
        .route(
            "/suppliers/:supplier_id/withdrawals",
            post(request_withdrawal::<S>),
        )
        .route("/withdrawals/:request_id/approve", post(approve_withdrawal::<S>))
        .route("/withdrawals/:request_id/reject", post(reject_withdrawal::<S>))
        .route("/withdrawals/:request_id/paid", post(mark_withdrawal_paid::<S>))
        // Subscriptions
        .route(
            "/suppliers/:supplier_id/subscription/payments",
            post(pay_subscription::<S>),
        )
        .route(
            "/suppliers/:supplier_id/subscription/plan",
            put(change_plan::<S>),
        )
        // Manual sweep triggers
        .route("/admin/sweeps/releases", post(sweep_releases::<S>))
        .route("/admin/sweeps/overdue", post(sweep_overdue::<S>))
}

fn parse_amount(raw: &str) -> Result<Amount, AppError> {
    raw.parse::<Amount>()
        .map_err(|e| AppError::InvalidRequest(format!("amount: {}", e)))
}

// =========================================================================
// POST /webhooks/payments/:gateway
// =========================================================================

/// Apply a payment confirmation or failure reported by a gateway.
///
/// Redelivered events answer 200 with a `duplicate_event` outcome so the
/// gateway stops retrying.
async fn payment_webhook<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(gateway): Path<String>,
    Extension(context): Extension<OperationContext>,
    body: Bytes,
) -> Result<Json<SettlementOutcome>, AppError> {
    let event: PaymentWebhook = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidRequest(format!("payload: {}", e)))?;
    let context = context.with_source("webhook");

    let outcome = match event.status {
        PaymentEventStatus::Paid => {
            let external_id = event.external_transaction_id.as_deref().ok_or_else(|| {
                AppError::InvalidRequest("external_transaction_id is required".to_string())
            })?;
            let amount = event
                .amount_paid
                .as_deref()
                .ok_or_else(|| AppError::InvalidRequest("amount_paid is required".to_string()))
                .and_then(parse_amount)?;

            let command =
                ConfirmPayment::new(event.order_id, &gateway, external_id, amount, &event.event_id)
                    .with_payload(&body);
            state.engine.confirm_order_payment(command, &context).await?
        }
        PaymentEventStatus::Failed => {
            let command = FailPayment::new(event.order_id, &gateway, &event.event_id, event.reason)
                .with_payload(&body);
            state.engine.fail_order_payment(command, &context).await?
        }
    };

    Ok(Json(outcome))
}

// =========================================================================
// POST /orders/:order_id/refund
// =========================================================================

async fn refund_order<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(order_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundOutcome>, AppError> {
    if request.reason.trim().is_empty() {
        return Err(AppError::InvalidRequest("reason is required".to_string()));
    }

    let outcome = state
        .engine
        .refund_order(order_id, request.reason.trim(), &context)
        .await?;

    Ok(Json(outcome))
}

// =========================================================================
// Supplier reads
// =========================================================================

async fn get_balance<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(supplier_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.engine.supplier_balance(supplier_id).await?;

    Ok(Json(BalanceResponse {
        supplier_id,
        available: balance.available,
        pending: balance.pending,
        blocked: balance.blocked,
        total: balance.total(),
    }))
}

async fn get_ledger<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(supplier_id): Path<Uuid>,
) -> Result<Json<LedgerResponse>, AppError> {
    let entries = state.engine.ledger_entries(supplier_id).await?;
    Ok(Json(LedgerResponse {
        supplier_id,
        entries,
    }))
}

async fn get_reconciliation<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(supplier_id): Path<Uuid>,
) -> Result<Json<ReconciliationReport>, AppError> {
    Ok(Json(state.engine.reconcile_supplier(supplier_id).await?))
}

// =========================================================================
// Withdrawals
// =========================================================================

async fn request_withdrawal<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(supplier_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<WithdrawalCreateRequest>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), AppError> {
    let amount = parse_amount(&request.amount)?;
    if request.payout_destination.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "payout_destination is required".to_string(),
        ));
    }

    let withdrawal = state
        .engine
        .request_withdrawal(supplier_id, amount, &request.payout_destination, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

async fn approve_withdrawal<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(request_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<AdminActionRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    let context = context.with_actor(request.admin_id);
    let withdrawal = state
        .engine
        .approve_withdrawal(request_id, request.admin_id, &context)
        .await?;
    Ok(Json(withdrawal))
}

async fn reject_withdrawal<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(request_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<RejectWithdrawalRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    if request.reason.trim().is_empty() {
        return Err(AppError::InvalidRequest("reason is required".to_string()));
    }

    let context = context.with_actor(request.admin_id);
    let withdrawal = state
        .engine
        .reject_withdrawal(request_id, request.reason.trim(), request.admin_id, &context)
        .await?;
    Ok(Json(withdrawal))
}

async fn mark_withdrawal_paid<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(request_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<AdminActionRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    let context = context.with_actor(request.admin_id);
    let withdrawal = state
        .engine
        .mark_withdrawal_paid(request_id, request.admin_id, &context)
        .await?;
    Ok(Json(withdrawal))
}

// =========================================================================
// Subscriptions
// =========================================================================

async fn pay_subscription<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(supplier_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<SubscriptionPaymentRequest>,
) -> Result<Json<SubscriptionReceipt>, AppError> {
    let amount = parse_amount(&request.amount)?;
    let receipt = state
        .engine
        .pay_subscription(supplier_id, amount, request.method, &context)
        .await?;
    Ok(Json(receipt))
}

async fn change_plan<S: SettlementStore>(
    State(state): State<AppState<S>>,
    Path(supplier_id): Path<Uuid>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<Json<PlanChange>, AppError> {
    let change = state
        .engine
        .change_plan(supplier_id, request.plan_id, &context)
        .await?;
    Ok(Json(change))
}

// =========================================================================
// Manual sweeps
// =========================================================================

async fn sweep_releases<S: SettlementStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<ReleaseSummary>, AppError> {
    Ok(Json(state.engine.sweep_releases().await?))
}

async fn sweep_overdue<S: SettlementStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<OverdueSweepResponse>, AppError> {
    let suppliers = state.engine.sweep_overdue_suppliers().await?;
    Ok(Json(OverdueSweepResponse { suppliers }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_webhook_deserialize() {
        let json = r#"{
            "event_id": "evt_123",
            "order_id": "550e8400-e29b-41d4-a716-446655440000",
            "status": "paid",
            "external_transaction_id": "pi_123",
            "amount_paid": "199.90"
        }"#;

        let event: PaymentWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, PaymentEventStatus::Paid);
        assert_eq!(event.amount_paid.as_deref(), Some("199.90"));
        assert!(event.reason.is_none());
    }

    #[test]
    fn test_subscription_payment_method_is_flattened() {
        let json = r#"{"amount": "49.90", "method": "external_charge", "charge_id": "ch_1"}"#;
        let request: SubscriptionPaymentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request.method,
            SubscriptionPaymentMethod::ExternalCharge {
                charge_id: "ch_1".to_string()
            }
        );

        let json = r#"{"amount": "49.90", "method": "balance"}"#;
        let request: SubscriptionPaymentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, SubscriptionPaymentMethod::Balance);
    }

    #[test]
    fn test_parse_amount_rejects_sub_cent() {
        assert!(parse_amount("10.005").is_err());
        assert_eq!(parse_amount("10.50").unwrap().value(), Decimal::new(1050, 2));
    }
}
