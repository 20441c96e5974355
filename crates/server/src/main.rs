//! Settlement worker entry point.

use metrics_exporter_prometheus::PrometheusBuilder;
use payment_store::{InMemoryPaymentStore, PaymentStoreError, PostgresPaymentStore};
use server::config::{Config, LogFormat};
use server::error::ServerError;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration and initialize tracing
    let config = Config::try_from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;

    // 3. Pick the payment store and run until a shutdown signal arrives
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresPaymentStore::connect(&url, 5).await?;
            store
                .run_migrations()
                .await
                .map_err(PaymentStoreError::from)?;
            tracing::info!("using Postgres payment store");
            server::worker::run(config, store, metrics_handle, shutdown_signal()).await?;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, pending payments are kept in memory");
            let store = InMemoryPaymentStore::new();
            server::worker::run(config, store, metrics_handle, shutdown_signal()).await?;
        }
    }

    tracing::info!("worker shut down gracefully");
    Ok(())
}
