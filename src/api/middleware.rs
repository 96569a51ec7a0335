//! API Middleware
//!
//! Request context extraction and request logging.

use std::net::IpAddr;

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::OperationContext;

/// Header carrying the admin or service acting on the request
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Header set by `SetRequestIdLayer`
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =========================================================================
// Operation context
// =========================================================================

/// Build the `OperationContext` handlers pass to the settlement engine.
///
/// The correlation id is the request id when it is a UUID; otherwise a fresh
/// one is generated so audit rows always carry one.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = context_from_headers(request.headers());
    request.extensions_mut().insert(context);
    next.run(request).await
}

pub fn context_from_headers(headers: &HeaderMap) -> OperationContext {
    let correlation_id = header_str(headers, REQUEST_ID_HEADER)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new()
        .with_source("api")
        .with_correlation_id(correlation_id);

    if let Some(actor_id) = header_str(headers, ACTOR_HEADER).and_then(|s| Uuid::parse_str(s).ok())
    {
        context = context.with_actor(actor_id);
    }

    // First hop of X-Forwarded-For is the original client
    if let Some(ip) = header_str(headers, "x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        context = context.with_client_ip(ip);
    }

    context
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "x-api-key",
    "authorization",
    "cookie",
    "set-cookie",
    "stripe-signature",
    "x-signature",
    "x-hub-signature",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::debug!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Request completed"
        );
    }

    response
}
