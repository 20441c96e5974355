//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p payment-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{AccountId, Money, OrderId, PaymentId};
use domain::{PaymentStatus, PendingPayment};
use payment_store::{PaymentStore, PaymentStoreError, PostgresPaymentStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = sqlx::PgPool::connect(&connection_string).await.unwrap();
            for migration in [
                include_str!("../../../migrations/001_create_pending_payments_table.sql"),
                include_str!("../../../migrations/002_add_outcome_published_at.sql"),
            ] {
                sqlx::raw_sql(migration).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a store with its own pool. Tests use unique order ids instead of
/// truncating, so they do not interfere with each other.
async fn get_test_store() -> PostgresPaymentStore {
    let info = get_container_info().await;

    PostgresPaymentStore::connect(&info.connection_string, 5)
        .await
        .unwrap()
}

fn unique_order() -> OrderId {
    OrderId::new(format!("order-{}", uuid::Uuid::new_v4()))
}

fn pending(order_id: OrderId) -> PendingPayment {
    PendingPayment::new(order_id, AccountId::new("U1"), Money::from_cents(10_005))
}

#[tokio::test]
async fn insert_and_read_back() {
    let store = get_test_store().await;
    let payment = pending(unique_order());

    let outcome = store.insert_pending(payment.clone()).await.unwrap();
    assert!(outcome.created);

    let stored = store.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.order_id, payment.order_id);
    assert_eq!(stored.user_id.as_str(), "U1");
    assert_eq!(stored.amount, Money::from_cents(10_005));
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(stored.authorization_reference.is_none());

    let by_order = store.find_by_order(&payment.order_id).await.unwrap().unwrap();
    assert_eq!(by_order.id, payment.id);
}

#[tokio::test]
async fn insert_is_idempotent_per_order() {
    let store = get_test_store().await;
    let order_id = unique_order();
    let first = pending(order_id.clone());
    store.insert_pending(first.clone()).await.unwrap();

    let outcome = store.insert_pending(pending(order_id)).await.unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.payment.id, first.id);
}

#[tokio::test]
async fn reused_payment_id_is_rejected() {
    let store = get_test_store().await;
    let first = pending(unique_order());
    store.insert_pending(first.clone()).await.unwrap();

    let mut clash = pending(unique_order());
    clash.id = first.id;
    let result = store.insert_pending(clash).await;

    assert!(matches!(result, Err(PaymentStoreError::Duplicate { .. })));
}

#[tokio::test]
async fn settle_moves_pending_once() {
    let store = get_test_store().await;
    let payment = pending(unique_order());
    store.insert_pending(payment.clone()).await.unwrap();

    let settled = store
        .mark_settled(payment.id, PaymentStatus::Completed, Some("12344".into()))
        .await
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert_eq!(settled.authorization_reference.as_deref(), Some("12344"));
    assert!(settled.updated_at.is_some());

    let again = store
        .mark_settled(payment.id, PaymentStatus::Failed, None)
        .await;
    assert!(matches!(
        again,
        Err(PaymentStoreError::AlreadySettled {
            status: PaymentStatus::Completed,
            ..
        })
    ));

    let stored = store.get(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn mark_published_is_recorded_once() {
    let store = get_test_store().await;
    let payment = pending(unique_order());
    store.insert_pending(payment.clone()).await.unwrap();
    store
        .mark_settled(payment.id, PaymentStatus::Failed, None)
        .await
        .unwrap();

    let stored = store.get(payment.id).await.unwrap().unwrap();
    assert!(stored.awaits_publication());

    let first = store.mark_published(payment.id).await.unwrap();
    let second = store.mark_published(payment.id).await.unwrap();
    assert!(first.outcome_published_at.is_some());
    assert_eq!(first.outcome_published_at, second.outcome_published_at);

    let by_order = store.find_by_order(&payment.order_id).await.unwrap().unwrap();
    assert!(!by_order.awaits_publication());
}

#[tokio::test]
async fn mark_published_unknown_payment_is_not_found() {
    let store = get_test_store().await;
    let result = store.mark_published(PaymentId::new()).await;
    assert!(matches!(result, Err(PaymentStoreError::NotFound(_))));
}

#[tokio::test]
async fn settle_unknown_payment_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .mark_settled(PaymentId::new(), PaymentStatus::Failed, None)
        .await;
    assert!(matches!(result, Err(PaymentStoreError::NotFound(_))));
}

#[tokio::test]
async fn missing_payment_reads_as_none() {
    let store = get_test_store().await;
    assert!(store.get(PaymentId::new()).await.unwrap().is_none());
    assert!(store.find_by_order(&unique_order()).await.unwrap().is_none());
}

#[tokio::test]
async fn run_migrations_is_idempotent() {
    let store = get_test_store().await;
    // Table already created by the raw SQL bootstrap.
    store.run_migrations().await.unwrap();
    assert!(store.count_by_status(PaymentStatus::Pending).await.is_ok());
}
