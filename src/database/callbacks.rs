use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Raw webhook delivery, kept verbatim for audit and manual reconciliation.
/// This table is the durable trace when correlation is impossible.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CallbackRecord {
    pub id: Uuid,
    pub provider: String,
    pub raw_payload: JsonValue,
    pub raw_headers: JsonValue,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait CallbackStore: Send + Sync {
    /// Append-only: one row per delivery, duplicates included.
    async fn append(
        &self,
        provider: &str,
        raw_payload: &JsonValue,
        raw_headers: &JsonValue,
    ) -> Result<CallbackRecord, DatabaseError>;
}

pub struct PgCallbackStore {
    pool: PgPool,
}

impl PgCallbackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallbackStore for PgCallbackStore {
    async fn append(
        &self,
        provider: &str,
        raw_payload: &JsonValue,
        raw_headers: &JsonValue,
    ) -> Result<CallbackRecord, DatabaseError> {
        sqlx::query_as::<_, CallbackRecord>(
            "INSERT INTO payment_callbacks (id, provider, raw_payload, raw_headers)
             VALUES ($1, $2, $3, $4)
             RETURNING id, provider, raw_payload, raw_headers, received_at",
        )
        .bind(Uuid::new_v4())
        .bind(provider)
        .bind(raw_payload.clone())
        .bind(raw_headers.clone())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
