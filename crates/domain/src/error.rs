//! Domain error types.

use thiserror::Error;

use crate::payment::PaymentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input rejected before any remote call was made.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An error occurred on a payment record.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
