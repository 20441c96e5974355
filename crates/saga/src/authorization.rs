//! Payment authorization with retry and local fallback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::PaymentStatus;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::services::{AuthorizationProvider, AuthorizationRequest};

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictSource {
    /// The external provider answered.
    Provider,
    /// The provider stayed unavailable; the reference was generated locally.
    Fallback,
}

/// Outcome of authorizing one payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: PaymentStatus,
    pub reference: u64,
    pub source: VerdictSource,
}

impl Verdict {
    /// Derives the verdict from a reference: even approves, odd declines.
    pub fn from_reference(reference: u64, source: VerdictSource) -> Self {
        let status = if reference % 2 == 0 {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        Self {
            status,
            reference,
            source,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == VerdictSource::Fallback
    }
}

type ReferenceGenerator = Arc<dyn Fn() -> u64 + Send + Sync>;

fn random_reference() -> u64 {
    rand::rng().random_range(10_000..100_000)
}

/// Wraps an [`AuthorizationProvider`] with retry and a local fallback.
///
/// Transient provider failures are retried per the policy. If every attempt
/// fails transiently, a reference is generated locally and the verdict is
/// derived from it with the same rule. This favours availability over
/// correctness. Non-transient errors propagate.
pub struct PaymentAuthorizer<A: AuthorizationProvider> {
    provider: A,
    policy: RetryPolicy,
    fallback: ReferenceGenerator,
    fallbacks: AtomicU64,
}

impl<A: AuthorizationProvider> PaymentAuthorizer<A> {
    /// Creates an authorizer whose fallback draws a random reference.
    pub fn new(provider: A, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            fallback: Arc::new(random_reference),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Replaces the fallback reference generator.
    pub fn with_fallback_generator(
        mut self,
        generator: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Arc::new(generator);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns how many verdicts came from the fallback.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Obtains a verdict for one order.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn authorize(&self, request: &AuthorizationRequest) -> Result<Verdict, SagaError> {
        let outcome = retry_with_policy(
            &self.policy,
            "authorize_payment",
            SagaError::is_transient,
            || {
                metrics::counter!("authorization_attempts_total").increment(1);
                self.provider.request_reference(request)
            },
        )
        .await;

        match outcome {
            Ok(reference) => Ok(Verdict::from_reference(reference, VerdictSource::Provider)),
            Err(err) if err.is_transient() => {
                let reference = (self.fallback)();
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("authorization_fallbacks_total").increment(1);
                tracing::warn!(
                    error = %err,
                    reference,
                    "authorization provider unavailable, using fallback reference"
                );
                Ok(Verdict::from_reference(reference, VerdictSource::Fallback))
            }
            Err(err) => Err(err),
        }
    }
}
