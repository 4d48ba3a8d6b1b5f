//! Outbox table persistence: transactional insert, the relay's claim
//! protocol, and the workflow view's correlation listing.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{OutboxEvent, OutboxStatus};

pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending event. Must run inside the same transaction as the
    /// domain change it announces; that is the whole point of the table.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox (
                id, event_type, payload, status,
                correlation_id, causation_id, producer,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            "#,
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.correlation_id)
        .bind(event.causation_id)
        .bind(&event.producer)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Outbox event inserted"
        );

        Ok(())
    }

    /// Claim up to `limit` publishable rows: oldest `new` rows first, marked
    /// `processing` and returned in one atomic statement. `FOR UPDATE SKIP
    /// LOCKED` makes concurrent relays skip each other's claims instead of
    /// blocking.
    pub async fn claim_batch(&self, limit: i64) -> StoreResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            WITH claimed AS (
                SELECT id
                FROM outbox
                WHERE status = 'new'
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox
            SET status = 'processing', updated_at = NOW()
            WHERE id IN (SELECT id FROM claimed)
            RETURNING id, event_type, payload, status,
                      correlation_id, causation_id, producer,
                      created_at, updated_at
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = rows
            .into_iter()
            .map(event_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        // UPDATE ... RETURNING does not promise row order; restore it so a
        // batch publishes in commit order within each correlation.
        events.sort_by_key(|e| e.created_at);

        Ok(events)
    }

    /// Finalize successfully published rows.
    pub async fn mark_processed(&self, ids: &[Uuid]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'processed', updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;

        debug!(count = ids.len(), "Outbox events marked processed");

        Ok(())
    }

    /// Return failed rows to `new` so the next tick re-claims them.
    pub async fn release_failed(&self, ids: &[Uuid]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'new', updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;

        warn!(count = ids.len(), "Outbox events released back to new");

        Ok(())
    }

    /// Reset rows stranded in `processing` (a relay crashed between claim and
    /// finalize) back to `new`. The age threshold protects rows a live peer
    /// is still publishing.
    pub async fn recover_stale(&self, older_than: Duration) -> StoreResult<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'new', updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// All events of one saga instance, oldest first.
    pub async fn list_by_correlation(&self, correlation_id: Uuid) -> StoreResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, status,
                   correlation_id, causation_id, producer,
                   created_at, updated_at
            FROM outbox
            WHERE correlation_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: PgRow) -> StoreResult<OutboxEvent> {
    let status: String = row.try_get("status")?;
    let status = OutboxStatus::from_str(&status)
        .map_err(|_| StoreError::invalid_column("status", status))?;

    Ok(OutboxEvent {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        status,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        producer: row.try_get("producer")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
