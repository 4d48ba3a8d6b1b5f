//! Order aggregate persistence.

use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Order, OrderStatus};

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order. Must run inside the transaction that also writes
    /// the `OrderCreated` outbox row.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, status, total_amount,
                from_city, to_city, travel_date, travel_time, airline,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(&order.from_city)
        .bind(&order.to_city)
        .bind(order.travel_date)
        .bind(&order.travel_time)
        .bind(&order.airline)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;

        debug!(order_id = %order.id, "Order inserted");

        Ok(())
    }

    /// Move an existing order to `status`. Zero rows affected means the order
    /// does not exist.
    pub async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: OrderStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound);
        }

        debug!(order_id = %id, status = status.as_str(), "Order status updated");

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount,
                   from_city, to_city, travel_date, travel_time, airline,
                   created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(order_from_row).transpose()
    }
}

fn order_from_row(row: PgRow) -> StoreResult<Order> {
    let status: String = row.try_get("status")?;
    let status = OrderStatus::from_str(&status)
        .map_err(|_| StoreError::invalid_column("status", status))?;

    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status,
        total_amount: row.try_get("total_amount")?,
        from_city: row.try_get("from_city")?,
        to_city: row.try_get("to_city")?,
        travel_date: row.try_get("travel_date")?,
        travel_time: row.try_get("travel_time")?,
        airline: row.try_get("airline")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
