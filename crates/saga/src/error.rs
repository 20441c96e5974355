//! Saga error types.

use domain::DomainError;
use event_bus::EventBusError;
use payment_store::PaymentStoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The remote entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote service could not be reached, timed out, or answered with
    /// something unusable.
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote entity already exists (or is already gone).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input was rejected, locally or by the remote service.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A compensation step failed.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// A forward step failed; `source` is the root cause.
    #[error("{saga} failed in {stage} step: {source}")]
    StageFailed {
        saga: &'static str,
        stage: &'static str,
        #[source]
        source: Box<SagaError>,
    },

    /// Payment store error.
    #[error("Payment store error: {0}")]
    PaymentStore(#[from] PaymentStoreError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A saga was asked to do something its current state does not allow.
    #[error("Invalid saga state: {0}")]
    InvalidState(String),
}

impl SagaError {
    /// Labels `source` with the saga and the step it failed in.
    pub fn stage_failed(saga: &'static str, stage: &'static str, source: SagaError) -> Self {
        SagaError::StageFailed {
            saga,
            stage,
            source: Box::new(source),
        }
    }

    /// Returns true for failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::RemoteUnavailable(_) => true,
            SagaError::StageFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Returns true when the remote side reports the entity already exists or
    /// is already gone.
    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), SagaError::Conflict(_))
    }

    /// Returns the innermost error behind any stage labels.
    pub fn root_cause(&self) -> &SagaError {
        match self {
            SagaError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the stage label, if the error carries one.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            SagaError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => SagaError::Validation(msg),
            DomainError::Payment(e) => SagaError::InvalidState(e.to_string()),
            DomainError::Serialization(e) => SagaError::Serialization(e),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
