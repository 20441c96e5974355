//! Error types for the worker and its HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_bus::EventBusError;
use payment_store::PaymentStoreError;
use saga::SagaError;
use thiserror::Error;

/// A configuration value could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors that stop the worker from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Saga setup error: {0}")]
    Saga(#[from] SagaError),

    #[error("Payment store error: {0}")]
    PaymentStore(#[from] PaymentStoreError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Metrics recorder error: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Event bus failure.
    Bus(EventBusError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Bus(err) => bus_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn bus_error_to_response(err: EventBusError) -> (StatusCode, String) {
    match &err {
        EventBusError::MissingField(_) | EventBusError::Serialization(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "event bus error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<EventBusError> for ApiError {
    fn from(err: EventBusError) -> Self {
        ApiError::Bus(err)
    }
}
