use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Commercial order, seen by the payment subsystem through this narrow
/// surface only. Orders are created and listed elsewhere; here they gain
/// payment linkage and the `paid` status.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: String,
    pub status: String,
    pub mpesa_phone: Option<String>,
    pub payment_method: Option<String>,
    pub payment_attempt_id: Option<Uuid>,
    pub receipt_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Durable proof of payment, created once per confirmed order.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub order_id: String,
    pub payment_attempt_id: Option<Uuid>,
    pub transaction_reference: String,
    pub amount: i64,
    pub phone: String,
    pub provider: String,
    pub provider_payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Receipt fields assembled by the correlator.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub payment_attempt_id: Option<Uuid>,
    pub transaction_reference: String,
    pub amount: i64,
    pub phone: String,
    pub provider: String,
    pub provider_payload: JsonValue,
}

/// Result of the conditional paid transition.
#[derive(Debug)]
pub enum SettleOutcome {
    Settled(Receipt),
    /// The order already carries a receipt; nothing was written.
    AlreadyReceipted,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: &str) -> Result<Option<Order>, DatabaseError>;

    /// Best-effort enrichment after initiation. Returns whether a row
    /// matched; never transitions status.
    async fn attach_payment(
        &self,
        order_id: &str,
        attempt_id: Uuid,
        msisdn: &str,
    ) -> Result<bool, DatabaseError>;

    /// Transition the order to paid and create its receipt, only if no
    /// receipt exists yet. Atomic with respect to concurrent deliveries of
    /// the same callback.
    async fn settle_order(
        &self,
        order_id: &str,
        receipt: NewReceipt,
    ) -> Result<SettleOutcome, DatabaseError>;
}

const ORDER_COLUMNS: &str =
    "id, status, mpesa_phone, payment_method, payment_attempt_id, receipt_id, paid_at";
const RECEIPT_COLUMNS: &str =
    "id, order_id, payment_attempt_id, transaction_reference, amount, phone, provider, provider_payload, created_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_order(&self, id: &str) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn attach_payment(
        &self,
        order_id: &str,
        attempt_id: Uuid,
        msisdn: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET payment_attempt_id = $2, mpesa_phone = $3, payment_method = 'mpesa'
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(attempt_id)
        .bind(msisdn)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn settle_order(
        &self,
        order_id: &str,
        receipt: NewReceipt,
    ) -> Result<SettleOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Claim the order first: only the delivery that wins this update
        // writes the receipt row.
        let claimed = sqlx::query(
            "UPDATE orders SET status = 'paid', paid_at = NOW()
             WHERE id = $1 AND receipt_id IS NULL",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(SettleOutcome::AlreadyReceipted);
        }

        let row = sqlx::query_as::<_, Receipt>(&format!(
            "INSERT INTO receipts (id, order_id, payment_attempt_id, transaction_reference, amount, phone, provider, provider_payload)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {RECEIPT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(receipt.payment_attempt_id)
        .bind(&receipt.transaction_reference)
        .bind(receipt.amount)
        .bind(&receipt.phone)
        .bind(&receipt.provider)
        .bind(receipt.provider_payload.clone())
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query("UPDATE orders SET receipt_id = $2 WHERE id = $1")
            .bind(order_id)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(SettleOutcome::Settled(row))
    }
}
