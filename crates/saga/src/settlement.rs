//! Order settlement saga.
//!
//! Turns each `order-created` event into exactly one terminal payment outcome:
//! record a pending payment, obtain a verdict, store it, and publish it to
//! `order-payment-processed` or `payment-failed`. Any error along the way is
//! published to `payment-failed` instead.

use std::sync::Arc;

use async_trait::async_trait;
use common::PaymentId;
use domain::{BusEvent, OrderCreatedEvent, PaymentProcessedEvent, PaymentStatus, PendingPayment};
use event_bus::{EventBus, EventBusExt, EventEnvelope, MessageHandler};
use payment_store::{PaymentStore, PaymentStoreError};

use crate::authorization::PaymentAuthorizer;
use crate::error::{Result, SagaError};
use crate::services::{AuthorizationProvider, AuthorizationRequest};
use crate::state::SettlementState;

/// What handling one event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// A terminal event was published.
    Published(PaymentProcessedEvent),
    /// The order was already settled and published by an earlier delivery;
    /// nothing was published.
    Duplicate(PendingPayment),
}

impl SettlementOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SettlementOutcome::Duplicate(_))
    }

    /// Returns the terminal status the order ended in.
    pub fn status(&self) -> PaymentStatus {
        match self {
            SettlementOutcome::Published(event) => event.status,
            SettlementOutcome::Duplicate(payment) => payment.status,
        }
    }
}

/// Per-delivery progress, kept for logging and the failure event.
#[derive(Debug, Default)]
struct Settlement {
    state: SettlementState,
    payment_id: Option<PaymentId>,
}

impl Settlement {
    fn advance(&mut self, next: SettlementState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid settlement transition {} -> {next}",
            self.state
        );
        self.state = next;
    }
}

enum Step {
    /// The verdict was stored by this delivery.
    Settled(PendingPayment),
    /// The payment was terminal before this delivery got to it.
    AlreadySettled(PendingPayment),
}

/// Settles orders against a payment store, an authorizer and a bus.
///
/// Safe under redelivery: an order whose payment is terminal and published is
/// acknowledged without side effects, a terminal payment whose outcome never
/// went out is published from the stored row, and one still pending (an
/// earlier delivery stopped mid-flight) resumes from authorization. Pending
/// payments are never re-scanned on their own; only a redelivered event moves
/// them.
pub struct SettlementSaga<S, A, B>
where
    S: PaymentStore,
    A: AuthorizationProvider,
    B: EventBus,
{
    store: S,
    authorizer: PaymentAuthorizer<A>,
    bus: Arc<B>,
}

impl<S, A, B> SettlementSaga<S, A, B>
where
    S: PaymentStore,
    A: AuthorizationProvider,
    B: EventBus,
{
    pub fn new(store: S, authorizer: PaymentAuthorizer<A>, bus: Arc<B>) -> Self {
        Self {
            store,
            authorizer,
            bus,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn authorizer(&self) -> &PaymentAuthorizer<A> {
        &self.authorizer
    }

    /// Settles one order.
    ///
    /// Returns an error only when the outcome could not be published; the
    /// event should then be redelivered, and the redelivery publishes the
    /// stored outcome.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn handle(&self, event: &OrderCreatedEvent) -> Result<SettlementOutcome> {
        metrics::counter!("settlement_events_total").increment(1);

        let mut settlement = Settlement::default();
        let (outcome, settled_id) = match self.settle(event, &mut settlement).await {
            Ok(Step::AlreadySettled(payment)) if !payment.awaits_publication() => {
                tracing::info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "order already settled, acknowledging duplicate"
                );
                metrics::counter!("settlement_outcomes_total", "status" => "DUPLICATE")
                    .increment(1);
                return Ok(SettlementOutcome::Duplicate(payment));
            }
            Ok(Step::AlreadySettled(payment)) => {
                tracing::info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "outcome of settled payment was never published, publishing it now"
                );
                metrics::counter!("settlement_republished_total").increment(1);
                (PaymentProcessedEvent::settled(&payment), Some(payment.id))
            }
            Ok(Step::Settled(payment)) => {
                settlement.advance(SettlementState::Settled);
                (PaymentProcessedEvent::settled(&payment), Some(payment.id))
            }
            Err(err) => {
                tracing::error!(
                    state = %settlement.state,
                    payment_id = ?settlement.payment_id,
                    error = %err,
                    "settlement failed"
                );
                settlement.advance(SettlementState::Failed);
                self.fail_payment(event, settlement.payment_id).await
            }
        };

        self.bus
            .publish_json(
                outcome.topic(),
                outcome.key(),
                outcome.event_type(),
                &outcome,
            )
            .await?;

        if let Some(id) = settled_id
            && let Err(err) = self.store.mark_published(id).await
        {
            tracing::warn!(
                payment_id = %id,
                error = %err,
                "could not record outcome publication, a redelivery will publish it again"
            );
        }

        metrics::counter!("settlement_outcomes_total", "status" => outcome.status.as_str())
            .increment(1);
        tracing::info!(
            status = %outcome.status,
            topic = outcome.topic(),
            "settlement outcome published"
        );
        Ok(SettlementOutcome::Published(outcome))
    }

    /// Moves a recorded payment to `FAILED` so a redelivery cannot settle it
    /// again, and builds the failure event.
    ///
    /// Returns the id to mark as published only when the row is terminal.
    async fn fail_payment(
        &self,
        event: &OrderCreatedEvent,
        payment_id: Option<PaymentId>,
    ) -> (PaymentProcessedEvent, Option<PaymentId>) {
        let Some(id) = payment_id else {
            return (PaymentProcessedEvent::failed(event.order_id.clone(), None), None);
        };

        match self.store.mark_settled(id, PaymentStatus::Failed, None).await {
            Ok(payment) => (PaymentProcessedEvent::settled(&payment), Some(payment.id)),
            Err(err) => {
                tracing::error!(
                    payment_id = %id,
                    error = %err,
                    "could not mark payment failed, it stays pending"
                );
                (
                    PaymentProcessedEvent::failed(event.order_id.clone(), Some(id)),
                    None,
                )
            }
        }
    }

    async fn settle(
        &self,
        event: &OrderCreatedEvent,
        settlement: &mut Settlement,
    ) -> Result<Step> {
        let recorded = self
            .store
            .insert_pending(PendingPayment::new(
                event.order_id.clone(),
                event.user_id.clone(),
                event.amount,
            ))
            .await?;
        let payment = recorded.payment;
        settlement.payment_id = Some(payment.id);

        if payment.is_settled() {
            return Ok(Step::AlreadySettled(payment));
        }
        if !recorded.created {
            tracing::info!(payment_id = %payment.id, "resuming pending payment");
        }
        settlement.advance(SettlementState::Authorizing);

        let verdict = self
            .authorizer
            .authorize(&AuthorizationRequest {
                order_id: payment.order_id.clone(),
                user_id: payment.user_id.clone(),
                amount: payment.amount,
            })
            .await?;
        tracing::info!(
            reference = verdict.reference,
            status = %verdict.status,
            fallback = verdict.is_fallback(),
            "authorization verdict received"
        );

        match self
            .store
            .mark_settled(payment.id, verdict.status, Some(verdict.reference.to_string()))
            .await
        {
            Ok(settled) => Ok(Step::Settled(settled)),
            Err(PaymentStoreError::AlreadySettled { id, .. }) => {
                let current = self
                    .store
                    .get(id)
                    .await?
                    .ok_or(PaymentStoreError::NotFound(id))?;
                Ok(Step::AlreadySettled(current))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Feeds `order-created` records from a consumer group into a
/// [`SettlementSaga`].
///
/// Records whose payload does not decode are logged and acknowledged.
pub struct SettlementConsumer<S, A, B>
where
    S: PaymentStore,
    A: AuthorizationProvider,
    B: EventBus,
{
    saga: Arc<SettlementSaga<S, A, B>>,
}

impl<S, A, B> SettlementConsumer<S, A, B>
where
    S: PaymentStore,
    A: AuthorizationProvider,
    B: EventBus,
{
    pub fn new(saga: Arc<SettlementSaga<S, A, B>>) -> Self {
        Self { saga }
    }
}

#[async_trait]
impl<S, A, B> MessageHandler for SettlementConsumer<S, A, B>
where
    S: PaymentStore + 'static,
    A: AuthorizationProvider + 'static,
    B: EventBus + 'static,
{
    type Error = SagaError;

    async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), SagaError> {
        let event = match envelope.decode::<OrderCreatedEvent>() {
            Ok(event) => event,
            Err(err) => {
                metrics::counter!("settlement_poison_messages_total").increment(1);
                tracing::warn!(
                    partition = envelope.partition,
                    offset = %envelope.offset,
                    key = %envelope.key,
                    error = %err,
                    "skipping undecodable order-created record"
                );
                return Ok(());
            }
        };
        self.saga.handle(&event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::services::InMemoryAuthorizationProvider;
    use common::{Money, OrderId};
    use domain::topics;
    use event_bus::InMemoryEventBus;
    use payment_store::InMemoryPaymentStore;
    use std::time::Duration;

    type Saga =
        SettlementSaga<InMemoryPaymentStore, InMemoryAuthorizationProvider, InMemoryEventBus>;

    fn setup(
        provider: InMemoryAuthorizationProvider,
    ) -> (Saga, InMemoryPaymentStore, Arc<InMemoryEventBus>) {
        let store = InMemoryPaymentStore::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let authorizer =
            PaymentAuthorizer::new(provider, RetryPolicy::new(3, Duration::from_millis(1)));
        (
            SettlementSaga::new(store.clone(), authorizer, Arc::clone(&bus)),
            store,
            bus,
        )
    }

    fn order(id: &str) -> OrderCreatedEvent {
        OrderCreatedEvent::new(id, "U1", Money::from_dollars(100))
    }

    #[tokio::test]
    async fn test_even_reference_publishes_processed() {
        let (saga, store, bus) = setup(InMemoryAuthorizationProvider::with_reference(12344));

        let outcome = saga.handle(&order("7")).await.unwrap();

        assert_eq!(outcome.status(), PaymentStatus::Completed);
        let payment = store.find_by_order(&OrderId::new("7")).await.unwrap().unwrap();
        assert_eq!(payment.authorization_reference.as_deref(), Some("12344"));
        assert_eq!(bus.message_count(topics::ORDER_PAYMENT_PROCESSED).await, 1);
        assert_eq!(bus.message_count(topics::PAYMENT_FAILED).await, 0);
    }

    #[tokio::test]
    async fn test_odd_reference_publishes_failed() {
        let (saga, store, bus) = setup(InMemoryAuthorizationProvider::with_reference(12345));

        let outcome = saga.handle(&order("42")).await.unwrap();

        assert_eq!(outcome.status(), PaymentStatus::Failed);
        let payment = store.find_by_order(&OrderId::new("42")).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);

        let published = bus.messages(topics::PAYMENT_FAILED).await;
        assert_eq!(published.len(), 1);
        let event: PaymentProcessedEvent = published[0].decode().unwrap();
        assert_eq!(event.payment_id, Some(payment.id));
        assert_eq!(published[0].key, "42");
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_acknowledged_silently() {
        let provider = InMemoryAuthorizationProvider::with_reference(2);
        let (saga, store, bus) = setup(provider.clone());

        saga.handle(&order("7")).await.unwrap();
        let second = saga.handle(&order("7")).await.unwrap();

        assert!(second.is_duplicate());
        assert_eq!(store.payment_count().await, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(bus.message_count(topics::ORDER_PAYMENT_PROCESSED).await, 1);
    }

    #[tokio::test]
    async fn test_pending_payment_resumes_on_redelivery() {
        let (saga, store, bus) = setup(InMemoryAuthorizationProvider::with_reference(4));
        let existing =
            PendingPayment::new(OrderId::new("9"), "U1".into(), Money::from_dollars(5));
        store.insert_pending(existing.clone()).await.unwrap();

        let outcome = saga.handle(&order("9")).await.unwrap();

        let SettlementOutcome::Published(event) = outcome else {
            panic!("expected a published outcome");
        };
        assert_eq!(event.payment_id, Some(existing.id));
        assert_eq!(store.payment_count().await, 1);
        assert_eq!(bus.message_count(topics::ORDER_PAYMENT_PROCESSED).await, 1);
    }

    #[tokio::test]
    async fn test_rejected_authorization_fails_payment_once() {
        let provider = InMemoryAuthorizationProvider::with_reference(2);
        provider.reject_next();
        let (saga, store, bus) = setup(provider.clone());

        let first = saga.handle(&order("13")).await.unwrap();
        let second = saga.handle(&order("13")).await.unwrap();

        assert_eq!(first.status(), PaymentStatus::Failed);
        assert!(second.is_duplicate());
        assert_eq!(provider.call_count(), 1);

        let payment = store.find_by_order(&OrderId::new("13")).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.outcome_published_at.is_some());

        let published = bus.messages(topics::PAYMENT_FAILED).await;
        assert_eq!(published.len(), 1);
        let event: PaymentProcessedEvent = published[0].decode().unwrap();
        assert_eq!(event.payment_id, Some(payment.id));
        assert_eq!(bus.message_count(topics::ORDER_PAYMENT_PROCESSED).await, 0);
    }

    /// Fails the first `failures` publishes, then forwards to an in-memory bus.
    struct FlakyBus {
        inner: InMemoryEventBus,
        failures: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(
            &self,
            record: event_bus::Record,
        ) -> event_bus::Result<event_bus::RecordMetadata> {
            use std::sync::atomic::Ordering;

            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(event_bus::EventBusError::Worker(
                    "broker unavailable".to_string(),
                ));
            }
            self.inner.publish(record).await
        }
    }

    #[tokio::test]
    async fn test_lost_publish_is_repaired_by_redelivery() {
        let provider = InMemoryAuthorizationProvider::with_reference(12344);
        let store = InMemoryPaymentStore::new();
        let bus = Arc::new(FlakyBus {
            inner: InMemoryEventBus::new(),
            failures: std::sync::atomic::AtomicUsize::new(1),
        });
        let saga = SettlementSaga::new(
            store.clone(),
            PaymentAuthorizer::new(provider.clone(), RetryPolicy::new(1, Duration::ZERO)),
            Arc::clone(&bus),
        );

        let first = saga.handle(&order("21")).await;
        assert!(matches!(first, Err(SagaError::EventBus(_))));
        let payment = store.find_by_order(&OrderId::new("21")).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.awaits_publication());

        let second = saga.handle(&order("21")).await.unwrap();
        let SettlementOutcome::Published(event) = second else {
            panic!("expected the stored outcome to be published");
        };
        assert_eq!(event.payment_id, Some(payment.id));
        assert_eq!(event.status, PaymentStatus::Completed);

        let third = saga.handle(&order("21")).await.unwrap();
        assert!(third.is_duplicate());

        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            bus.inner.message_count(topics::ORDER_PAYMENT_PROCESSED).await,
            1
        );
        let payment = store.find_by_order(&OrderId::new("21")).await.unwrap().unwrap();
        assert!(!payment.awaits_publication());
    }

    #[tokio::test]
    async fn test_poison_message_is_skipped() {
        let (saga, _, bus) = setup(InMemoryAuthorizationProvider::new());
        let consumer = SettlementConsumer::new(Arc::new(saga));
        bus.publish_json(
            topics::ORDER_CREATED,
            "x",
            "OrderCreated",
            &serde_json::json!({"bogus": true}),
        )
        .await
        .unwrap();
        let envelope = bus.messages(topics::ORDER_CREATED).await.remove(0);

        consumer.handle(&envelope).await.unwrap();

        assert_eq!(bus.message_count(topics::PAYMENT_FAILED).await, 0);
        assert_eq!(bus.message_count(topics::ORDER_PAYMENT_PROCESSED).await, 0);
    }
}
