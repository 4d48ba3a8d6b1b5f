//! The broker contract shared by every service: the event envelope and the
//! typed payloads that travel inside it.
//!
//! The envelope is what the outbox relay puts on the wire and what every
//! consumer parses first. Payloads stay opaque (`serde_json::Value`) at the
//! envelope level; each consumer deserializes only the payloads it accepts.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type tags carried in `EventEnvelope::event_type` and
/// `outbox.event_type`.
pub mod event_type {
    pub const ORDER_CREATED: &str = "OrderCreated";
    pub const PAYMENT_AUTHORIZED: &str = "PaymentAuthorized";
    pub const PAYMENT_FAILED: &str = "PaymentFailed";
    pub const TICKET_ISSUED: &str = "TicketIssued";
    pub const REFUND_INITIATED: &str = "RefundInitiated";
}

/// Envelope published to the broker.
///
/// `correlation_id` is the saga instance (the order id) and doubles as the
/// broker partition key, so all events of one order stay strictly ordered.
/// `causation_id` points at the event that triggered this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub event_type: String,

    pub correlation_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    pub producer: String,

    pub occurred_at: DateTime<Utc>,

    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Broker message key: the correlation id, falling back to the event id
    /// for events that carry none.
    pub fn message_key(&self) -> String {
        self.correlation_id.unwrap_or(self.id).to_string()
    }
}

/// Payload of `PaymentAuthorized`: the payment identity plus the itinerary
/// echoed from the order, so the ticket service never reads the orders table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorizedPayload {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub travel_date: Option<NaiveDate>,
    pub travel_time: Option<String>,
    pub airline: Option<String>,
}

/// Payload of `PaymentFailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub order_id: Uuid,
    pub reason: String,
}

/// Payload of `TicketIssued`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketIssuedPayload {
    pub order_id: Uuid,
    pub ticket_id: Uuid,
}

/// Payload of `RefundInitiated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundInitiatedPayload {
    pub order_id: Uuid,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            id: Uuid::new_v4(),
            event_type: event_type::ORDER_CREATED.to_string(),
            correlation_id: Some(Uuid::new_v4()),
            causation_id: None,
            producer: "order-service".to_string(),
            occurred_at: Utc::now(),
            payload: json!({"id": "abc"}),
        }
    }

    #[test]
    fn envelope_round_trips() {
        let env = envelope();
        let raw = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope = serde_json::from_str(&raw).unwrap();

        assert_eq!(back.id, env.id);
        assert_eq!(back.event_type, "OrderCreated");
        assert_eq!(back.correlation_id, env.correlation_id);
        assert_eq!(back.causation_id, None);
        assert_eq!(back.payload, env.payload);
    }

    #[test]
    fn causation_is_omitted_when_empty() {
        let env = envelope();
        let raw = serde_json::to_value(&env).unwrap();
        assert!(raw.get("causation_id").is_none());
        assert_eq!(raw["type"], "OrderCreated");
    }

    #[test]
    fn envelope_parses_without_causation_field() {
        let raw = json!({
            "id": "7f8a7e4e-3e3b-4f6e-9d35-0b7e1a1f2c3d",
            "type": "TicketIssued",
            "correlation_id": "9b2c6a1e-8d4f-4a5b-b6c7-d8e9f0a1b2c3",
            "producer": "ticket-service",
            "occurred_at": "2025-01-01T10:00:00Z",
            "payload": {}
        });

        let env: EventEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.event_type, event_type::TICKET_ISSUED);
        assert_eq!(env.causation_id, None);
    }

    #[test]
    fn message_key_prefers_correlation_id() {
        let env = envelope();
        assert_eq!(
            env.message_key(),
            env.correlation_id.unwrap().to_string()
        );

        let mut keyless = envelope();
        keyless.correlation_id = None;
        assert_eq!(keyless.message_key(), keyless.id.to_string());
    }

    #[test]
    fn payment_payload_accepts_json_numbers() {
        let raw = json!({
            "order_id": "9b2c6a1e-8d4f-4a5b-b6c7-d8e9f0a1b2c3",
            "payment_id": "7f8a7e4e-3e3b-4f6e-9d35-0b7e1a1f2c3d",
            "amount": 100.0,
            "from_city": "A",
            "to_city": "B",
            "travel_date": "2025-01-01",
            "travel_time": "10:00",
            "airline": "X"
        });

        let payload: PaymentAuthorizedPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.amount, Decimal::new(100, 0));
        assert_eq!(payload.travel_date.unwrap().to_string(), "2025-01-01");

        let back = serde_json::to_value(&payload).unwrap();
        assert_eq!(back["amount"], json!(100.0));
    }
}
