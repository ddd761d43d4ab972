use crate::database::error::DatabaseError;
use crate::payments::types::AttemptStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One push-payment attempt against the gateway.
///
/// Created by the initiator, mutated only by the correlator (status and
/// `provider_callback`), never deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub msisdn: String,
    pub amount: i64,
    pub external_reference: Option<String>,
    pub provider_response: Option<JsonValue>,
    pub provider_callback: Option<JsonValue>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new attempt row.
#[derive(Debug, Clone)]
pub struct NewPaymentAttempt {
    pub msisdn: String,
    pub amount: i64,
    pub external_reference: Option<String>,
    pub provider_response: Option<JsonValue>,
    pub status: AttemptStatus,
}

#[async_trait]
pub trait PaymentAttemptStore: Send + Sync {
    async fn insert(&self, attempt: NewPaymentAttempt) -> Result<PaymentAttempt, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentAttempt>, DatabaseError>;

    /// Match an attempt whose stored gateway reply carries this transaction
    /// reference. An empty result is a valid answer: the callback can race
    /// ahead of the initiation write.
    async fn find_by_transaction_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, DatabaseError>;

    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, DatabaseError>;

    /// Terminal status transition driven by the gateway callback.
    async fn record_outcome(
        &self,
        id: Uuid,
        status: AttemptStatus,
        callback: &JsonValue,
    ) -> Result<(), DatabaseError>;
}

const ATTEMPT_COLUMNS: &str =
    "id, msisdn, amount, external_reference, provider_response, provider_callback, status, created_at";

pub struct PgPaymentAttemptStore {
    pool: PgPool,
}

impl PgPaymentAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentAttemptStore for PgPaymentAttemptStore {
    async fn insert(&self, attempt: NewPaymentAttempt) -> Result<PaymentAttempt, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(&format!(
            "INSERT INTO payment_attempts (id, msisdn, amount, external_reference, provider_response, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&attempt.msisdn)
        .bind(attempt.amount)
        .bind(&attempt.external_reference)
        .bind(&attempt.provider_response)
        .bind(attempt.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentAttempt>, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_transaction_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts
             WHERE provider_response ->> 'TransactionReference' = $1
                OR provider_response -> 'data' ->> 'TransactionReference' = $1
                OR provider_response ->> 'CheckoutRequestID' = $1
                OR provider_response -> 'data' ->> 'CheckoutRequestID' = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts
             WHERE external_reference = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        status: AttemptStatus,
        callback: &JsonValue,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_attempts SET status = $2, provider_callback = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(callback.clone())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                entity: "PaymentAttempt".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
