//! Bus ingress endpoint.
//!
//! Lets upstream producers without a Kafka client hand `order-created` events
//! to the worker over HTTP.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{BusEvent, OrderCreatedEvent};
use event_bus::EventBusExt;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedResponse {
    pub topic: &'static str,
    pub key: String,
    pub partition: u32,
    pub offset: u64,
}

/// POST /events/order-created publishes an order for settlement.
pub async fn publish_order_created(
    State(state): State<Arc<AppState>>,
    Json(event): Json<OrderCreatedEvent>,
) -> Result<(StatusCode, Json<PublishedResponse>), ApiError> {
    if event.order_id.as_str().is_empty() {
        return Err(ApiError::BadRequest("orderId must not be empty".to_string()));
    }
    if !event.amount.is_positive() {
        return Err(ApiError::BadRequest("amount must be positive".to_string()));
    }

    let metadata = state
        .bus
        .publish_json(event.topic(), event.key(), event.event_type(), &event)
        .await?;

    metrics::counter!("bus_ingress_events_total", "topic" => event.topic()).increment(1);
    tracing::info!(
        order_id = %event.order_id,
        partition = metadata.partition,
        offset = %metadata.offset,
        "order-created event accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishedResponse {
            topic: event.topic(),
            key: event.key().to_string(),
            partition: metadata.partition,
            offset: metadata.offset.as_u64(),
        }),
    ))
}
