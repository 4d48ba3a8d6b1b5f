//! Payment rows, unique per order. The unique constraint doubles as an
//! optimistic lock: a replayed insert is a no-op and the first writer wins.

use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Payment, PaymentStatus};

pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, status, amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.status.as_str())
        .bind(payment.amount)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut **tx)
        .await?;

        debug!(order_id = %payment.order_id, payment_id = %payment.id, "Payment inserted");

        Ok(())
    }

    pub async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, amount, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(payment_from_row).transpose()
    }
}

fn payment_from_row(row: PgRow) -> StoreResult<Payment> {
    let status: String = row.try_get("status")?;
    let status = PaymentStatus::from_str(&status)
        .map_err(|_| StoreError::invalid_column("status", status))?;

    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        status,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
