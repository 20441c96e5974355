pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{PaymentStoreError, Result};
pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use store::{InsertOutcome, PaymentStore};
