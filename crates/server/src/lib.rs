//! Settlement worker with ops endpoints.
//!
//! Runs the order settlement saga as a Kafka consumer group and serves
//! `/health`, `/metrics` and the bus ingress route, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_bus::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by the HTTP handlers.
pub struct AppState {
    pub bus: Arc<dyn EventBus>,
    /// Name of the bus backend, reported by `/health`.
    pub backend: &'static str,
    pub consumer_group: String,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/events/order-created",
            post(routes::events::publish_order_created),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
