//! Remote service traits, in-memory fakes, and HTTP clients.

pub mod authorization;
pub mod card;
pub mod http;
pub mod identity;
pub mod order;
pub mod profile;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use authorization::{
    AuthorizationProvider, AuthorizationRequest, InMemoryAuthorizationProvider,
};
pub use card::CardService;
pub use http::{
    HttpAuthorizationClient, HttpCardClient, HttpClientConfig, HttpIdentityClient,
    HttpOrderClient, HttpProfileClient,
};
pub use identity::{IdentityService, InMemoryIdentityService};
pub use order::{InMemoryOrderService, OrderService};
pub use profile::{InMemoryProfileService, ProfileService};

// Fakes keep working after a panicking test thread poisoned their lock.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
