//! Pending payment record and its status machine.

mod status;

pub use status::PaymentStatus;

use chrono::{DateTime, Utc};
use common::{AccountId, Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by payment status changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The requested status change is not allowed.
    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// A stored status string did not match any known status.
    #[error("Unknown payment status: {0}")]
    UnknownStatus(String),
}

/// Audit record of one order's settlement.
///
/// Written in `PENDING` before any authorization attempt, moved once to a
/// terminal status, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: AccountId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Reference returned by the authorizer (or generated by the fallback).
    pub authorization_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Set once the terminal outcome event has been published.
    #[serde(default)]
    pub outcome_published_at: Option<DateTime<Utc>>,
}

impl PendingPayment {
    /// Creates a new record in `PENDING`.
    pub fn new(order_id: OrderId, user_id: AccountId, amount: Money) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            amount,
            status: PaymentStatus::Pending,
            authorization_reference: None,
            created_at: Utc::now(),
            updated_at: None,
            outcome_published_at: None,
        }
    }

    /// Returns true once the record reached `COMPLETED` or `FAILED`.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the record is terminal but its outcome event has not
    /// gone out yet.
    pub fn awaits_publication(&self) -> bool {
        self.is_settled() && self.outcome_published_at.is_none()
    }

    /// Moves the record to a terminal status.
    pub fn settle(
        &mut self,
        status: PaymentStatus,
        reference: Option<String>,
    ) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(status) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.authorization_reference = reference;
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}
