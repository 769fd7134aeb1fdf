//! PostgreSQL implementation of EventStore.
//!
//! The primary key on `dedup_key`, the unique index on `idempotency_key`
//! and an untargeted `ON CONFLICT DO NOTHING` make the insert atomic: of
//! two racing deliveries sharing either key exactly one affects a row.

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::webhook::{InsertOutcome, WebhookEventRecord};
use crate::ports::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    dedup_key: String,
    event_id: Option<String>,
    idempotency_key: Option<String>,
    transaction_reference: String,
    event_name: String,
    payload_digest: String,
    received_at: DateTime<Utc>,
}

impl From<EventRow> for WebhookEventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            dedup_key: row.dedup_key,
            event_id: row.event_id,
            idempotency_key: row.idempotency_key,
            transaction_reference: row.transaction_reference,
            event_name: row.event_name,
            payload_digest: row.payload_digest,
            received_at: Timestamp::from_datetime(row.received_at),
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn insert(&self, record: &WebhookEventRecord) -> Result<InsertOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                dedup_key, event_id, idempotency_key, transaction_reference,
                event_name, payload_digest, received_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&record.dedup_key)
        .bind(&record.event_id)
        .bind(&record.idempotency_key)
        .bind(&record.transaction_reference)
        .bind(&record.event_name)
        .bind(&record.payload_digest)
        .bind(record.received_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record webhook event: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::already_exists())
        } else {
            Ok(InsertOutcome::inserted())
        }
    }

    async fn exists(&self, dedup_key: &str) -> Result<bool, DomainError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM webhook_events
                WHERE dedup_key = $1 OR 'idem:' || idempotency_key = $1
            )
            "#,
        )
        .bind(dedup_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check webhook event: {}", e)))?;
        Ok(exists)
    }

    async fn find(&self, dedup_key: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT dedup_key, event_id, idempotency_key, transaction_reference,
                   event_name, payload_digest, received_at
            FROM webhook_events
            WHERE dedup_key = $1 OR 'idem:' || idempotency_key = $1
            LIMIT 1
            "#,
        )
        .bind(dedup_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find webhook event: {}", e)))?;

        Ok(row.map(WebhookEventRecord::from))
    }

    async fn find_matching(
        &self,
        record: &WebhookEventRecord,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT dedup_key, event_id, idempotency_key, transaction_reference,
                   event_name, payload_digest, received_at
            FROM webhook_events
            WHERE dedup_key = $1
               OR ($2::TEXT IS NOT NULL AND idempotency_key = $2)
            ORDER BY received_at
            LIMIT 1
            "#,
        )
        .bind(&record.dedup_key)
        .bind(&record.idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find webhook event: {}", e)))?;

        Ok(row.map(WebhookEventRecord::from))
    }
}
