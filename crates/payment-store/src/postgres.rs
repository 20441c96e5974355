use async_trait::async_trait;
use common::{AccountId, Money, OrderId, PaymentId};
use domain::{PaymentStatus, PendingPayment};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    PaymentStoreError, Result,
    store::{InsertOutcome, PaymentStore},
};

const COLUMNS: &str = "id, order_id, user_id, amount_cents, status, \
     authorization_reference, created_at, updated_at, outcome_published_at";

/// PostgreSQL-backed payment store implementation.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_payment(row: PgRow) -> Result<PendingPayment> {
        let status: String = row.try_get("status")?;

        Ok(PendingPayment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            user_id: AccountId::new(row.try_get::<String, _>("user_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status: status.parse()?,
            authorization_reference: row.try_get("authorization_reference")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            outcome_published_at: row.try_get("outcome_published_at")?,
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert_pending(&self, payment: PendingPayment) -> Result<InsertOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO pending_payments
                (id, order_id, user_id, amount_cents, status, authorization_reference,
                 created_at, updated_at, outcome_published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_str())
        .bind(payment.user_id.as_str())
        .bind(payment.amount.cents())
        .bind(payment.status.as_str())
        .bind(payment.authorization_reference.as_deref())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.outcome_published_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return PaymentStoreError::Duplicate {
                    id: payment.id,
                    order_id: payment.order_id.clone(),
                };
            }
            PaymentStoreError::Database(e)
        })?;

        if inserted.rows_affected() == 1 {
            return Ok(InsertOutcome {
                payment,
                created: true,
            });
        }

        // Lost the race or a redelivery: hand back whatever is stored.
        let existing = self
            .find_by_order(&payment.order_id)
            .await?
            .ok_or(PaymentStoreError::NotFound(payment.id))?;
        Ok(InsertOutcome {
            payment: existing,
            created: false,
        })
    }

    async fn mark_settled(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        reference: Option<String>,
    ) -> Result<PendingPayment> {
        if !PaymentStatus::Pending.can_transition_to(status) {
            return Err(domain::PaymentError::InvalidTransition {
                from: PaymentStatus::Pending,
                to: status,
            }
            .into());
        }

        let sql = format!(
            "UPDATE pending_payments \
             SET status = $2, authorization_reference = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(reference.as_deref())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_payment(row),
            None => match self.get(id).await? {
                Some(existing) => Err(PaymentStoreError::AlreadySettled {
                    id,
                    status: existing.status,
                }),
                None => Err(PaymentStoreError::NotFound(id)),
            },
        }
    }

    async fn mark_published(&self, id: PaymentId) -> Result<PendingPayment> {
        let sql = format!(
            "UPDATE pending_payments \
             SET outcome_published_at = COALESCE(outcome_published_at, NOW()) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(PaymentStoreError::NotFound(id))?;
        Self::row_to_payment(row)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<PendingPayment>> {
        let sql = format!("SELECT {COLUMNS} FROM pending_payments WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_payment)
            .transpose()
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<PendingPayment>> {
        let sql = format!("SELECT {COLUMNS} FROM pending_payments WHERE order_id = $1");
        sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_payment)
            .transpose()
    }

    async fn count_by_status(&self, status: PaymentStatus) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_payments WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
