//! Payloads exchanged on the event bus.

use common::{AccountId, Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::payment::{PaymentStatus, PendingPayment};

/// Topic names used by the settlement flow.
pub mod topics {
    /// Emitted by the order service for every new order.
    pub const ORDER_CREATED: &str = "order-created";
    /// Authorized payments.
    pub const ORDER_PAYMENT_PROCESSED: &str = "order-payment-processed";
    /// Declined payments and settlements that errored.
    pub const PAYMENT_FAILED: &str = "payment-failed";
}

/// An event published on the bus.
///
/// Events are immutable facts keyed for per-key ordering.
pub trait BusEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, carried as a header.
    fn event_type(&self) -> &'static str;

    /// Returns the partitioning key.
    fn key(&self) -> &str;

    /// Returns the topic this event belongs on.
    fn topic(&self) -> &'static str;
}

/// A new order awaiting payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub user_id: AccountId,
    pub amount: Money,
}

impl OrderCreatedEvent {
    /// Creates an order-created event.
    pub fn new(order_id: impl Into<OrderId>, user_id: impl Into<AccountId>, amount: Money) -> Self {
        Self {
            order_id: order_id.into(),
            user_id: user_id.into(),
            amount,
        }
    }
}

impl BusEvent for OrderCreatedEvent {
    fn event_type(&self) -> &'static str {
        "OrderCreated"
    }

    fn key(&self) -> &str {
        self.order_id.as_str()
    }

    fn topic(&self) -> &'static str {
        topics::ORDER_CREATED
    }
}

/// Terminal outcome of one order's settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProcessedEvent {
    pub order_id: OrderId,
    /// Absent when the pending payment could not even be recorded.
    pub payment_id: Option<PaymentId>,
    pub status: PaymentStatus,
}

impl PaymentProcessedEvent {
    /// Creates the outcome event for a settled payment.
    pub fn settled(payment: &PendingPayment) -> Self {
        Self {
            order_id: payment.order_id.clone(),
            payment_id: Some(payment.id),
            status: payment.status,
        }
    }

    /// Creates the outcome event for a settlement that errored.
    pub fn failed(order_id: OrderId, payment_id: Option<PaymentId>) -> Self {
        Self {
            order_id,
            payment_id,
            status: PaymentStatus::Failed,
        }
    }
}

impl BusEvent for PaymentProcessedEvent {
    fn event_type(&self) -> &'static str {
        match self.status {
            PaymentStatus::Completed => "PaymentProcessed",
            _ => "PaymentFailed",
        }
    }

    fn key(&self) -> &str {
        self.order_id.as_str()
    }

    fn topic(&self) -> &'static str {
        match self.status {
            PaymentStatus::Completed => topics::ORDER_PAYMENT_PROCESSED,
            _ => topics::PAYMENT_FAILED,
        }
    }
}
