//! Sagas for the account lifecycle and order settlement.
//!
//! This crate provides:
//! - [`AccountSagaCoordinator`]: registration (profile → credentials) and
//!   deletion (profile → credentials → orders), compensating completed steps
//!   in reverse when a later step fails
//! - [`CompensationManager`]: best-effort, idempotent undo actions
//! - [`SettlementSaga`]: one terminal payment outcome per `order-created`
//!   event, tolerant of redelivery
//! - [`PaymentAuthorizer`]: retry with exponential backoff and a local
//!   fallback verdict
//! - Service traits with in-memory fakes and HTTP clients

pub mod account;
pub mod authorization;
pub mod compensation;
pub mod error;
pub mod retry;
pub mod services;
pub mod settlement;
pub mod state;
pub mod steps;

pub use account::AccountSagaCoordinator;
pub use authorization::{PaymentAuthorizer, Verdict, VerdictSource};
pub use compensation::{CardRestoreReport, CompensationManager, CompensationOutcome};
pub use error::{Result, SagaError};
pub use retry::{RetryPolicy, retry_with_policy};
pub use services::{
    AuthorizationProvider, AuthorizationRequest, CardService, HttpAuthorizationClient,
    HttpCardClient, HttpClientConfig, HttpIdentityClient, HttpOrderClient, HttpProfileClient,
    IdentityService, InMemoryAuthorizationProvider, InMemoryIdentityService, InMemoryOrderService,
    InMemoryProfileService, OrderService, ProfileService,
};
pub use settlement::{SettlementConsumer, SettlementOutcome, SettlementSaga};
pub use state::{SagaState, SettlementState};
