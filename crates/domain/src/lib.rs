//! Domain model for the account lifecycle and order settlement sagas.
//!
//! This crate provides:
//! - Profile, card and credential records owned by the downstream services
//! - The registration request and the `DeletionResult` snapshot type
//! - The `PendingPayment` audit record and its status machine
//! - Event payloads exchanged on the bus

pub mod account;
pub mod error;
pub mod events;
pub mod payment;

pub use account::{
    AccountSummary, Card, CredentialSnapshot, DeletionResult, NewCard, NewProfile, Profile,
    ProfileDeletion, RegistrationRequest, Role,
};
pub use error::DomainError;
pub use events::{BusEvent, OrderCreatedEvent, PaymentProcessedEvent, topics};
pub use payment::{PaymentError, PaymentStatus, PendingPayment};
