//! Ticket rows, unique per order, itinerary copied from the event payload.

use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Ticket, TicketStatus};

pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ticket: &Ticket,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, order_id,
                from_city, to_city, travel_date, travel_time, airline,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.order_id)
        .bind(&ticket.from_city)
        .bind(&ticket.to_city)
        .bind(ticket.travel_date)
        .bind(&ticket.travel_time)
        .bind(&ticket.airline)
        .bind(ticket.status.as_str())
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut **tx)
        .await?;

        debug!(order_id = %ticket.order_id, ticket_id = %ticket.id, "Ticket inserted");

        Ok(())
    }

    pub async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id,
                   from_city, to_city, travel_date, travel_time, airline,
                   status, created_at, updated_at
            FROM tickets
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ticket_from_row).transpose()
    }
}

fn ticket_from_row(row: PgRow) -> StoreResult<Ticket> {
    let status: String = row.try_get("status")?;
    let status = TicketStatus::from_str(&status)
        .map_err(|_| StoreError::invalid_column("status", status))?;

    Ok(Ticket {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        from_city: row.try_get("from_city")?,
        to_city: row.try_get("to_city")?,
        travel_date: row.try_get("travel_date")?,
        travel_time: row.try_get("travel_time")?,
        airline: row.try_get("airline")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
