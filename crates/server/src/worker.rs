//! Wiring of the sagas onto their HTTP collaborators and Kafka.

use std::future::Future;
use std::sync::Arc;

use event_bus::{EventBusError, KafkaEventBus, KafkaGroupConsumer};
use metrics_exporter_prometheus::PrometheusHandle;
use payment_store::PaymentStore;
use saga::{
    AccountSagaCoordinator, HttpAuthorizationClient, HttpCardClient, HttpIdentityClient,
    HttpOrderClient, HttpProfileClient, PaymentAuthorizer, SagaError, SettlementConsumer,
    SettlementSaga,
};
use tokio::sync::watch;

use crate::config::Config;
use crate::error::ServerError;
use crate::{AppState, create_app};

/// Account sagas talking to the real services.
pub type HttpAccountCoordinator =
    AccountSagaCoordinator<HttpProfileClient, HttpIdentityClient, HttpOrderClient, HttpCardClient>;

/// Consumer group running the settlement saga against the HTTP authorizer.
pub type SettlementWorker<S> =
    KafkaGroupConsumer<SettlementConsumer<S, HttpAuthorizationClient, KafkaEventBus>>;

/// Builds the account sagas over one shared HTTP client.
pub fn account_coordinator(config: &Config) -> Result<HttpAccountCoordinator, SagaError> {
    let client = config.http_client_config().build_client()?;

    Ok(AccountSagaCoordinator::new(
        HttpProfileClient::with_client(client.clone(), &config.profile_service_url),
        HttpIdentityClient::with_client(client.clone(), &config.identity_service_url),
        HttpOrderClient::with_client(client.clone(), &config.order_service_url),
        HttpCardClient::with_client(client, &config.card_service_url),
    ))
}

/// Builds the settlement consumer group for `store`, publishing outcomes on
/// `bus`.
pub fn settlement_worker<S>(
    config: &Config,
    store: S,
    bus: Arc<KafkaEventBus>,
) -> Result<SettlementWorker<S>, ServerError>
where
    S: PaymentStore + 'static,
{
    let provider =
        HttpAuthorizationClient::new(&config.authorization_url, &config.http_client_config())?;
    let authorizer = PaymentAuthorizer::new(provider, config.retry_policy());
    let saga = Arc::new(SettlementSaga::new(store, authorizer, bus));

    let worker = KafkaGroupConsumer::new(
        &config.kafka_config(),
        Arc::new(SettlementConsumer::new(saga)),
        config.settlement_consumer_config(),
    )?;
    Ok(worker)
}

/// Runs the settlement consumer and the ops server until `shutdown` resolves.
///
/// The HTTP server drains first; the consumer then finishes the record it is
/// handling and stops.
pub async fn run<S>(
    config: Config,
    store: S,
    metrics_handle: PrometheusHandle,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError>
where
    S: PaymentStore + 'static,
{
    let bus = Arc::new(KafkaEventBus::new(&config.kafka_config())?);
    let worker = settlement_worker(&config, store, Arc::clone(&bus))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let consumer = tokio::spawn(worker.run(stop_rx));

    let state = Arc::new(AppState {
        bus,
        backend: "kafka",
        consumer_group: config.settlement_consumer_group.clone(),
    });
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "ops server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    tracing::info!("stopping settlement consumer");
    if stop_tx.send(true).is_err() {
        tracing::debug!("settlement consumer already stopped");
    }
    let consumed = consumer
        .await
        .map_err(|e| EventBusError::Worker(e.to_string()))?;

    served?;
    consumed?;
    Ok(())
}
