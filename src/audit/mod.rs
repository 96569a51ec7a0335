//! Audit Log
//!
//! Every financial state change writes an audit record inside the same
//! transaction as the change itself, so the trail can never disagree with
//! the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    PaymentConfirmed,
    PaymentFailed,
    OrderRefunded,
    OrderCancelled,
    BalanceReleased,
    WithdrawalRequested,
    WithdrawalApproved,
    WithdrawalPaid,
    WithdrawalRejected,
    SubscriptionPaid,
    PlanChanged,
    SupplierOverdue,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PaymentConfirmed => "order.payment_confirmed",
            AuditAction::PaymentFailed => "order.payment_failed",
            AuditAction::OrderRefunded => "order.refunded",
            AuditAction::OrderCancelled => "order.cancelled",
            AuditAction::BalanceReleased => "balance.released",
            AuditAction::WithdrawalRequested => "withdrawal.requested",
            AuditAction::WithdrawalApproved => "withdrawal.approved",
            AuditAction::WithdrawalPaid => "withdrawal.paid",
            AuditAction::WithdrawalRejected => "withdrawal.rejected",
            AuditAction::SubscriptionPaid => "subscription.paid",
            AuditAction::PlanChanged => "subscription.plan_changed",
            AuditAction::SupplierOverdue => "supplier.marked_overdue",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub source: Option<String>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub changed_fields: Option<Vec<String>>,
    pub client_ip: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
}

/// Builder for creating audit records
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    changed_fields: Option<Vec<String>>,
}

impl AuditLogBuilder {
    /// Create a new audit log builder
    pub fn new(action: AuditAction) -> Self {
        Self {
            action: action.as_str().to_string(),
            resource_type: None,
            resource_id: None,
            before_state: None,
            after_state: None,
            changed_fields: None,
        }
    }

    /// Set the resource type and ID
    pub fn resource(mut self, resource_type: &str, resource_id: Uuid) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    /// Set the before state
    pub fn before_state<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    /// Set the after state
    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }

    /// Set the changed fields
    pub fn changed_fields(mut self, fields: &[&str]) -> Self {
        self.changed_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Stamp actor, correlation and origin from the operation context
    pub fn build(self, context: &OperationContext) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            actor_id: context.actor_id,
            correlation_id: context.correlation_id,
            source: context.source.clone(),
            before_state: self.before_state,
            after_state: self.after_state,
            changed_fields: self.changed_fields,
            client_ip: context.client_ip,
            created_at: Utc::now(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
