//! Order service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{AccountId, OrderId};

use super::{read, write};
use crate::error::SagaError;

/// Trait for order service operations used by the account sagas.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Deletes every order placed by an account.
    async fn delete_all_for_user(&self, account_id: &AccountId) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<AccountId, Vec<OrderId>>,
    fail_on_delete: bool,
    delete_calls: usize,
}

/// In-memory order service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderService {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderService {
    /// Creates a new in-memory order service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an order for an account.
    pub fn add_order(&self, account_id: &AccountId, order_id: impl Into<OrderId>) {
        write(&self.state)
            .orders
            .entry(account_id.clone())
            .or_default()
            .push(order_id.into());
    }

    /// Configures delete calls to fail as if the service were down.
    pub fn set_fail_on_delete(&self, fail: bool) {
        write(&self.state).fail_on_delete = fail;
    }

    /// Returns the number of orders stored for an account.
    pub fn order_count(&self, account_id: &AccountId) -> usize {
        read(&self.state).orders.get(account_id).map_or(0, Vec::len)
    }

    /// Returns how many delete calls were made.
    pub fn delete_calls(&self) -> usize {
        read(&self.state).delete_calls
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn delete_all_for_user(&self, account_id: &AccountId) -> Result<(), SagaError> {
        let mut state = write(&self.state);
        state.delete_calls += 1;

        if state.fail_on_delete {
            return Err(SagaError::RemoteUnavailable(
                "order service unavailable".to_string(),
            ));
        }

        // Deleting zero orders is not an error.
        state.orders.remove(account_id);
        Ok(())
    }
}
