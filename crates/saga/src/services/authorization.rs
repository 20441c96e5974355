//! External payment authorization provider.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{AccountId, Money, OrderId};
use serde::Serialize;

use super::{read, write};
use crate::error::SagaError;

/// What is sent to the provider for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub order_id: OrderId,
    pub user_id: AccountId,
    pub amount: Money,
}

/// Trait for the external authorizer.
///
/// The provider answers with a numeric reference; the caller derives the
/// verdict from it.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Requests an authorization reference for the order.
    async fn request_reference(&self, request: &AuthorizationRequest) -> Result<u64, SagaError>;
}

#[derive(Debug)]
enum Scripted {
    Reference(u64),
    Unavailable,
    Rejected,
}

#[derive(Debug, Default)]
struct InMemoryAuthorizationState {
    script: VecDeque<Scripted>,
    default_reference: u64,
    requests: Vec<AuthorizationRequest>,
}

/// Scripted authorization provider for testing.
///
/// Answers queued responses first, then falls back to a fixed reference
/// (0, i.e. approved, unless changed).
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthorizationProvider {
    state: Arc<RwLock<InMemoryAuthorizationState>>,
}

impl InMemoryAuthorizationProvider {
    /// Creates a provider that approves everything with reference 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that always answers `reference`.
    pub fn with_reference(reference: u64) -> Self {
        let provider = Self::new();
        write(&provider.state).default_reference = reference;
        provider
    }

    /// Queues `reference` as the next answer.
    pub fn push_reference(&self, reference: u64) {
        write(&self.state)
            .script
            .push_back(Scripted::Reference(reference));
    }

    /// Queues `times` transient failures.
    pub fn fail_next(&self, times: usize) {
        let mut state = write(&self.state);
        for _ in 0..times {
            state.script.push_back(Scripted::Unavailable);
        }
    }

    /// Queues one non-transient rejection.
    pub fn reject_next(&self) {
        write(&self.state).script.push_back(Scripted::Rejected);
    }

    /// Returns how many requests were made.
    pub fn call_count(&self) -> usize {
        read(&self.state).requests.len()
    }

    /// Returns every request received, in order.
    pub fn requests(&self) -> Vec<AuthorizationRequest> {
        read(&self.state).requests.clone()
    }
}

#[async_trait]
impl AuthorizationProvider for InMemoryAuthorizationProvider {
    async fn request_reference(&self, request: &AuthorizationRequest) -> Result<u64, SagaError> {
        let mut state = write(&self.state);
        state.requests.push(request.clone());

        match state.script.pop_front() {
            Some(Scripted::Reference(reference)) => Ok(reference),
            Some(Scripted::Unavailable) => Err(SagaError::RemoteUnavailable(
                "authorization provider unavailable".to_string(),
            )),
            Some(Scripted::Rejected) => Err(SagaError::Validation(format!(
                "authorization request for order {} rejected",
                request.order_id
            ))),
            None => Ok(state.default_reference),
        }
    }
}
