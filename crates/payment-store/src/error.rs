use common::{OrderId, PaymentId};
use domain::{PaymentError, PaymentStatus};
use thiserror::Error;

/// Errors that can occur when reading or writing pending payments.
#[derive(Debug, Error)]
pub enum PaymentStoreError {
    /// No payment with this id exists.
    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    /// A payment with the same id but a different order already exists.
    #[error("Duplicate payment id {id} for order {order_id}")]
    Duplicate { id: PaymentId, order_id: OrderId },

    /// The payment already left PENDING; terminal rows are never rewritten.
    #[error("Payment {id} is already {status}")]
    AlreadySettled { id: PaymentId, status: PaymentStatus },

    /// A status change or stored status was rejected by the payment model.
    #[error("Invalid payment state: {0}")]
    Payment(#[from] PaymentError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for payment store operations.
pub type Result<T> = std::result::Result<T, PaymentStoreError>;
