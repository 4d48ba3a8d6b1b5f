//! Inbox (dedup) records, one per `(consumer, event_id)`.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::InboxEvent;

pub struct InboxRepository {
    pool: PgPool,
}

impl InboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record that `consumer` is applying `event_id`. Returns `true` when the
    /// row was inserted (first delivery) and `false` on conflict (replay).
    /// Must run inside the same transaction as the consumer's side effects:
    /// the conflict check and the effects become visible atomically.
    pub async fn insert_if_absent(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        consumer: &str,
        event_id: Uuid,
        event_type: &str,
        correlation_id: Option<Uuid>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO inbox_events (consumer, event_id, event_type, correlation_id, processed_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (consumer, event_id) DO NOTHING
            "#,
        )
        .bind(consumer)
        .bind(event_id)
        .bind(event_type)
        .bind(correlation_id)
        .execute(&mut **tx)
        .await?;

        let inserted = result.rows_affected() > 0;

        if !inserted {
            debug!(
                consumer = consumer,
                event_id = %event_id,
                "Duplicate delivery, inbox row already present"
            );
        }

        Ok(inserted)
    }

    /// All dedup records of one saga instance across consumers, oldest first.
    pub async fn list_by_correlation(&self, correlation_id: Uuid) -> StoreResult<Vec<InboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT consumer, event_id, event_type, correlation_id, processed_at
            FROM inbox_events
            WHERE correlation_id = $1
            ORDER BY processed_at ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(inbox_from_row).collect()
    }
}

fn inbox_from_row(row: PgRow) -> StoreResult<InboxEvent> {
    Ok(InboxEvent {
        consumer: row.try_get("consumer")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        correlation_id: row.try_get("correlation_id")?,
        processed_at: row.try_get("processed_at")?,
    })
}
