//! The ticketing saga step: `PaymentAuthorized` in, `TicketIssued` out, one
//! ticket row per order with the itinerary copied from the event payload.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use consumer_runtime::EventHandler;
use saga_events::{event_type, EventEnvelope, PaymentAuthorizedPayload, TicketIssuedPayload};
use saga_store::{OutboxEvent, OutboxRepository, Ticket, TicketRepository, TicketStatus};
use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

const CONSUMER: &str = "ticket-service";

pub struct TicketHandler {
    tickets: TicketRepository,
    outbox: OutboxRepository,
}

impl TicketHandler {
    pub fn new(tickets: TicketRepository, outbox: OutboxRepository) -> Self {
        Self { tickets, outbox }
    }
}

#[async_trait]
impl EventHandler for TicketHandler {
    fn consumer_name(&self) -> &'static str {
        CONSUMER
    }

    fn accepted_types(&self) -> &'static [&'static str] {
        &[event_type::PAYMENT_AUTHORIZED]
    }

    async fn handle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        envelope: &EventEnvelope,
    ) -> anyhow::Result<()> {
        let payment: PaymentAuthorizedPayload = serde_json::from_value(envelope.payload.clone())
            .context("malformed PaymentAuthorized payload")?;

        let ticket = ticket_from_payment(&payment);
        self.tickets.insert(tx, &ticket).await?;

        let payload = TicketIssuedPayload {
            order_id: payment.order_id,
            ticket_id: ticket.id,
        };
        let event = OutboxEvent::new(
            event_type::TICKET_ISSUED,
            Some(payment.order_id),
            Some(envelope.id),
            CONSUMER,
            serde_json::to_value(&payload)?,
        );
        self.outbox.insert(tx, &event).await?;

        info!(
            order_id = %payment.order_id,
            ticket_id = %ticket.id,
            event_id = %envelope.id,
            "Ticket issued"
        );

        Ok(())
    }
}

fn ticket_from_payment(payment: &PaymentAuthorizedPayload) -> Ticket {
    let now = Utc::now();
    Ticket {
        id: Uuid::new_v4(),
        order_id: payment.order_id,
        from_city: payment.from_city.clone(),
        to_city: payment.to_city.clone(),
        travel_date: payment.travel_date,
        travel_time: payment.travel_time.clone(),
        airline: payment.airline.clone(),
        status: TicketStatus::Issued,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn ticket_copies_the_payload_itinerary() {
        let payment = PaymentAuthorizedPayload {
            order_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            amount: Decimal::new(10000, 2),
            from_city: Some("A".to_string()),
            to_city: Some("B".to_string()),
            travel_date: Some("2025-01-01".parse().unwrap()),
            travel_time: Some("10:00".to_string()),
            airline: Some("X".to_string()),
        };

        let ticket = ticket_from_payment(&payment);

        assert_eq!(ticket.order_id, payment.order_id);
        assert_eq!(ticket.status, TicketStatus::Issued);
        assert_eq!(ticket.from_city, payment.from_city);
        assert_eq!(ticket.to_city, payment.to_city);
        assert_eq!(ticket.travel_date, payment.travel_date);
        assert_eq!(ticket.travel_time, payment.travel_time);
        assert_eq!(ticket.airline, payment.airline);
    }

    #[tokio::test]
    async fn only_payment_authorized_is_accepted() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let handler = TicketHandler::new(
            TicketRepository::new(pool.clone()),
            OutboxRepository::new(pool),
        );

        assert_eq!(handler.accepted_types(), &["PaymentAuthorized"]);
        assert_eq!(handler.consumer_name(), "ticket-service");
    }
}
