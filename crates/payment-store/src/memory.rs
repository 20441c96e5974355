use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId};
use domain::{PaymentStatus, PendingPayment};
use tokio::sync::RwLock;

use crate::{
    PaymentStoreError, Result,
    store::{InsertOutcome, PaymentStore},
};

/// In-memory payment store for testing and single-process deployments.
///
/// Provides the same guarantees as the PostgreSQL implementation: one row per
/// order, and a guarded PENDING-to-terminal update.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<OrderId, PendingPayment>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }

    /// Returns every stored payment.
    pub async fn all(&self) -> Vec<PendingPayment> {
        self.payments.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_pending(&self, payment: PendingPayment) -> Result<InsertOutcome> {
        let mut payments = self.payments.write().await;

        if let Some(existing) = payments.get(&payment.order_id) {
            return Ok(InsertOutcome {
                payment: existing.clone(),
                created: false,
            });
        }

        if payments.values().any(|p| p.id == payment.id) {
            return Err(PaymentStoreError::Duplicate {
                id: payment.id,
                order_id: payment.order_id,
            });
        }

        payments.insert(payment.order_id.clone(), payment.clone());
        Ok(InsertOutcome {
            payment,
            created: true,
        })
    }

    async fn mark_settled(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        reference: Option<String>,
    ) -> Result<PendingPayment> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .values_mut()
            .find(|p| p.id == id)
            .ok_or(PaymentStoreError::NotFound(id))?;

        if payment.is_settled() {
            return Err(PaymentStoreError::AlreadySettled {
                id,
                status: payment.status,
            });
        }

        payment.settle(status, reference)?;
        Ok(payment.clone())
    }

    async fn mark_published(&self, id: PaymentId) -> Result<PendingPayment> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .values_mut()
            .find(|p| p.id == id)
            .ok_or(PaymentStoreError::NotFound(id))?;

        payment.outcome_published_at.get_or_insert_with(Utc::now);
        Ok(payment.clone())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<PendingPayment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<PendingPayment>> {
        Ok(self.payments.read().await.get(order_id).cloned())
    }

    async fn count_by_status(&self, status: PaymentStatus) -> Result<u64> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AccountId, Money};
    use domain::PaymentError;

    fn pending(order: &str) -> PendingPayment {
        PendingPayment::new(
            OrderId::new(order),
            AccountId::new("U1"),
            Money::from_dollars(100),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryPaymentStore::new();
        let payment = pending("42");

        let outcome = store.insert_pending(payment.clone()).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.payment, payment);

        let found = store.find_by_order(&OrderId::new("42")).await.unwrap();
        assert_eq!(found, Some(payment.clone()));
        assert_eq!(store.get(payment.id).await.unwrap(), Some(payment));
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_order() {
        let store = InMemoryPaymentStore::new();
        let first = pending("42");
        store.insert_pending(first.clone()).await.unwrap();

        let outcome = store.insert_pending(pending("42")).await.unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.payment.id, first.id);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_reused_payment_id() {
        let store = InMemoryPaymentStore::new();
        let first = pending("1");
        store.insert_pending(first.clone()).await.unwrap();

        let mut clash = pending("2");
        clash.id = first.id;
        let result = store.insert_pending(clash).await;

        assert!(matches!(result, Err(PaymentStoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_mark_settled_once() {
        let store = InMemoryPaymentStore::new();
        let payment = pending("42");
        store.insert_pending(payment.clone()).await.unwrap();

        let settled = store
            .mark_settled(payment.id, PaymentStatus::Failed, Some("12345".into()))
            .await
            .unwrap();
        assert_eq!(settled.status, PaymentStatus::Failed);
        assert_eq!(settled.authorization_reference.as_deref(), Some("12345"));
        assert!(settled.updated_at.is_some());

        let again = store
            .mark_settled(payment.id, PaymentStatus::Completed, None)
            .await;
        assert!(matches!(
            again,
            Err(PaymentStoreError::AlreadySettled {
                status: PaymentStatus::Failed,
                ..
            })
        ));
        assert_eq!(
            store.get(payment.id).await.unwrap().unwrap().status,
            PaymentStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_mark_settled_rejects_pending_target() {
        let store = InMemoryPaymentStore::new();
        let payment = pending("42");
        store.insert_pending(payment.clone()).await.unwrap();

        let result = store
            .mark_settled(payment.id, PaymentStatus::Pending, None)
            .await;
        assert!(matches!(
            result,
            Err(PaymentStoreError::Payment(PaymentError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_mark_settled_unknown_payment() {
        let store = InMemoryPaymentStore::new();
        let result = store
            .mark_settled(PaymentId::new(), PaymentStatus::Completed, None)
            .await;
        assert!(matches!(result, Err(PaymentStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_published_keeps_first_timestamp() {
        let store = InMemoryPaymentStore::new();
        let payment = pending("42");
        store.insert_pending(payment.clone()).await.unwrap();
        store
            .mark_settled(payment.id, PaymentStatus::Completed, None)
            .await
            .unwrap();

        let first = store.mark_published(payment.id).await.unwrap();
        let second = store.mark_published(payment.id).await.unwrap();

        assert!(first.outcome_published_at.is_some());
        assert_eq!(first.outcome_published_at, second.outcome_published_at);
        assert!(!second.awaits_publication());
    }

    #[tokio::test]
    async fn test_mark_published_unknown_payment() {
        let store = InMemoryPaymentStore::new();
        let result = store.mark_published(PaymentId::new()).await;
        assert!(matches!(result, Err(PaymentStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let store = InMemoryPaymentStore::new();
        let a = pending("1");
        store.insert_pending(a.clone()).await.unwrap();
        store.insert_pending(pending("2")).await.unwrap();
        store
            .mark_settled(a.id, PaymentStatus::Completed, None)
            .await
            .unwrap();

        assert_eq!(store.count_by_status(PaymentStatus::Pending).await.unwrap(), 1);
        assert_eq!(store.count_by_status(PaymentStatus::Completed).await.unwrap(), 1);
        assert_eq!(store.count_by_status(PaymentStatus::Failed).await.unwrap(), 0);
    }
}
