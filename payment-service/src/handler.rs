//! The payment saga step: `OrderCreated` in, `PaymentAuthorized` (or
//! `PaymentFailed`) out, one payment row per order.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use consumer_runtime::EventHandler;
use rand::Rng;
use saga_events::{
    event_type, EventEnvelope, PaymentAuthorizedPayload, PaymentFailedPayload,
};
use saga_store::{Order, OutboxEvent, OutboxRepository, Payment, PaymentRepository, PaymentStatus};
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

const CONSUMER: &str = "payment-service";

enum Authorization {
    Approved,
    Declined(String),
}

pub struct PaymentHandler {
    payments: PaymentRepository,
    outbox: OutboxRepository,
    /// Probability that the simulated authorization declines. Zero by
    /// default; raised in test environments to exercise the cancel path.
    failure_rate: f64,
}

impl PaymentHandler {
    pub fn new(payments: PaymentRepository, outbox: OutboxRepository, failure_rate: f64) -> Self {
        Self {
            payments,
            outbox,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Stand-in for the external payment provider call.
    fn authorize(&self, order: &Order) -> Authorization {
        if self.failure_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.failure_rate {
            warn!(order_id = %order.id, "Simulated authorization decline");
            return Authorization::Declined("authorization declined".to_string());
        }
        Authorization::Approved
    }
}

#[async_trait]
impl EventHandler for PaymentHandler {
    fn consumer_name(&self) -> &'static str {
        CONSUMER
    }

    fn accepted_types(&self) -> &'static [&'static str] {
        &[event_type::ORDER_CREATED]
    }

    async fn handle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        envelope: &EventEnvelope,
    ) -> anyhow::Result<()> {
        let order: Order = serde_json::from_value(envelope.payload.clone())
            .context("malformed OrderCreated payload")?;

        let now = Utc::now();

        match self.authorize(&order) {
            Authorization::Approved => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    status: PaymentStatus::Authorized,
                    amount: order.total_amount,
                    created_at: now,
                    updated_at: now,
                };
                self.payments.insert(tx, &payment).await?;

                let payload = authorized_payload(&order, payment.id);
                let event = OutboxEvent::new(
                    event_type::PAYMENT_AUTHORIZED,
                    Some(order.id),
                    Some(envelope.id),
                    CONSUMER,
                    serde_json::to_value(&payload)?,
                );
                self.outbox.insert(tx, &event).await?;

                info!(
                    order_id = %order.id,
                    payment_id = %payment.id,
                    event_id = %envelope.id,
                    "Payment authorized"
                );
            }
            Authorization::Declined(reason) => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    status: PaymentStatus::Failed,
                    amount: order.total_amount,
                    created_at: now,
                    updated_at: now,
                };
                self.payments.insert(tx, &payment).await?;

                let payload = PaymentFailedPayload {
                    order_id: order.id,
                    reason: reason.clone(),
                };
                let event = OutboxEvent::new(
                    event_type::PAYMENT_FAILED,
                    Some(order.id),
                    Some(envelope.id),
                    CONSUMER,
                    serde_json::to_value(&payload)?,
                );
                self.outbox.insert(tx, &event).await?;

                warn!(order_id = %order.id, reason = %reason, "Payment failed");
            }
        }

        Ok(())
    }
}

/// Echo the itinerary into the payload so the ticket service never has to
/// read the orders table.
fn authorized_payload(order: &Order, payment_id: Uuid) -> PaymentAuthorizedPayload {
    PaymentAuthorizedPayload {
        order_id: order.id,
        payment_id,
        amount: order.total_amount,
        from_city: order.from_city.clone(),
        to_city: order.to_city.clone(),
        travel_date: order.travel_date,
        travel_time: order.travel_time.clone(),
        airline: order.airline.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use saga_store::OrderStatus;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            status: OrderStatus::Created,
            total_amount: Decimal::new(10000, 2),
            from_city: Some("A".to_string()),
            to_city: Some("B".to_string()),
            travel_date: Some("2025-01-01".parse().unwrap()),
            travel_time: Some("10:00".to_string()),
            airline: Some("X".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn payload_echoes_the_itinerary() {
        let order = sample_order();
        let payment_id = Uuid::new_v4();

        let payload = authorized_payload(&order, payment_id);

        assert_eq!(payload.order_id, order.id);
        assert_eq!(payload.payment_id, payment_id);
        assert_eq!(payload.amount, order.total_amount);
        assert_eq!(payload.from_city, order.from_city);
        assert_eq!(payload.to_city, order.to_city);
        assert_eq!(payload.travel_date, order.travel_date);
        assert_eq!(payload.airline, order.airline);
    }

    #[tokio::test]
    async fn zero_failure_rate_always_approves() {
        let handler = handler_with_rate(0.0);
        let order = sample_order();

        for _ in 0..100 {
            assert!(matches!(handler.authorize(&order), Authorization::Approved));
        }
    }

    #[tokio::test]
    async fn full_failure_rate_always_declines() {
        let handler = handler_with_rate(1.0);
        let order = sample_order();

        for _ in 0..100 {
            assert!(matches!(
                handler.authorize(&order),
                Authorization::Declined(_)
            ));
        }
    }

    #[tokio::test]
    async fn failure_rate_is_clamped() {
        let handler = handler_with_rate(7.5);
        assert_eq!(handler.failure_rate, 1.0);

        let handler = handler_with_rate(-1.0);
        assert_eq!(handler.failure_rate, 0.0);
    }

    #[tokio::test]
    async fn only_order_created_is_accepted() {
        let handler = handler_with_rate(0.0);
        assert_eq!(handler.accepted_types(), &["OrderCreated"]);
        assert_eq!(handler.consumer_name(), "payment-service");
    }

    fn handler_with_rate(rate: f64) -> PaymentHandler {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        PaymentHandler::new(
            PaymentRepository::new(pool.clone()),
            OutboxRepository::new(pool),
            rate,
        )
    }
}
