use async_trait::async_trait;
use common::{OrderId, PaymentId};
use domain::{PaymentStatus, PendingPayment};

use crate::Result;

/// Result of recording a pending payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// The row now stored for the order.
    pub payment: PendingPayment,
    /// False when a row for the order already existed and was returned as is.
    pub created: bool,
}

/// Storage for pending payments.
///
/// There is at most one payment per order. A payment is written in
/// `PENDING`, moves once to `COMPLETED` or `FAILED`, and is never deleted.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Stores `payment` unless a payment for its order already exists.
    ///
    /// When one exists, the stored row is returned unchanged with
    /// `created == false`.
    async fn insert_pending(&self, payment: PendingPayment) -> Result<InsertOutcome>;

    /// Moves a `PENDING` payment to a terminal status.
    ///
    /// Fails with `AlreadySettled` if the payment is no longer pending and
    /// with `NotFound` if it does not exist.
    async fn mark_settled(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        reference: Option<String>,
    ) -> Result<PendingPayment>;

    /// Records that the terminal outcome of a payment has been published.
    ///
    /// Keeps the first timestamp when called again. Fails with `NotFound` if
    /// the payment does not exist.
    async fn mark_published(&self, id: PaymentId) -> Result<PendingPayment>;

    /// Retrieves a payment by id.
    async fn get(&self, id: PaymentId) -> Result<Option<PendingPayment>>;

    /// Retrieves the payment recorded for an order.
    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<PendingPayment>>;

    /// Counts payments currently in `status`.
    async fn count_by_status(&self, status: PaymentStatus) -> Result<u64>;
}
