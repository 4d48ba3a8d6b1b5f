//! The terminal saga step: saga events move the order row through its
//! status machine. The mapping is fixed; the broker's per-partition order
//! keeps transitions serialized per order.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use consumer_runtime::EventHandler;
use saga_events::{event_type, EventEnvelope};
use saga_store::{status_for_event, OrderRepository};
use sqlx::{Postgres, Transaction};
use tracing::info;

const CONSUMER: &str = "order-service";

pub struct OrderStatusHandler {
    orders: OrderRepository,
}

impl OrderStatusHandler {
    pub fn new(orders: OrderRepository) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl EventHandler for OrderStatusHandler {
    fn consumer_name(&self) -> &'static str {
        CONSUMER
    }

    fn accepted_types(&self) -> &'static [&'static str] {
        &[
            event_type::PAYMENT_AUTHORIZED,
            event_type::TICKET_ISSUED,
            event_type::PAYMENT_FAILED,
        ]
    }

    async fn handle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        envelope: &EventEnvelope,
    ) -> anyhow::Result<()> {
        let status = status_for_event(&envelope.event_type)
            .ok_or_else(|| anyhow!("no status transition for {}", envelope.event_type))?;

        let order_id = envelope
            .correlation_id
            .context("envelope has no correlation id")?;

        self.orders.update_status(tx, order_id, status).await?;

        info!(
            order_id = %order_id,
            event_type = %envelope.event_type,
            status = status.as_str(),
            "Order status advanced"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_store::OrderStatus;

    #[tokio::test]
    async fn all_accepted_types_have_a_transition() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let handler = OrderStatusHandler::new(OrderRepository::new(pool));

        for event_type in handler.accepted_types() {
            assert!(status_for_event(event_type).is_some(), "{event_type}");
        }
    }

    #[test]
    fn transitions_follow_the_fixed_map() {
        assert_eq!(
            status_for_event("PaymentAuthorized"),
            Some(OrderStatus::PaymentAuthorized)
        );
        assert_eq!(
            status_for_event("TicketIssued"),
            Some(OrderStatus::TicketIssued)
        );
        assert_eq!(status_for_event("PaymentFailed"), Some(OrderStatus::Cancelled));
    }
}
