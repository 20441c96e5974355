//! Shared identifiers and value types for the account and settlement sagas.

mod money;
mod types;

pub use money::{InvalidAmount, Money};
pub use types::{AccountId, OrderId, PaymentId};
