//! Withdrawal requests
//!
//! State machine: PENDING -> APPROVED -> PAID, or PENDING/APPROVED -> REJECTED.
//! PAID and REJECTED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

text_enum!(WithdrawalStatus {
    Pending => "pending",
    Approved => "approved",
    Paid => "paid",
    Rejected => "rejected",
});

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Paid | WithdrawalStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Paid) | (Approved, Paid) | (Pending, Rejected)
                | (Approved, Rejected)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub amount: Amount,
    /// PIX key or other payout destination
    pub payout_destination: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
    pub admin_note: Option<String>,
}

impl WithdrawalRequest {
    pub fn new(supplier_id: Uuid, amount: Amount, payout_destination: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            supplier_id,
            amount,
            payout_destination,
            status: WithdrawalStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
            processed_by: None,
            admin_note: None,
        }
    }

    /// Move to `next`, recording who did it. Fails on terminal or skipped states.
    pub fn transition(
        &self,
        next: WithdrawalStatus,
        admin_id: Uuid,
        note: Option<String>,
    ) -> Result<WithdrawalRequest, DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_transition(
                "WithdrawalRequest",
                self.status,
                next,
            ));
        }

        let mut updated = self.clone();
        updated.status = next;
        updated.processed_by = Some(admin_id);
        updated.processed_at = Some(Utc::now());
        if note.is_some() {
            updated.admin_note = note;
        }
        Ok(updated)
    }
}
