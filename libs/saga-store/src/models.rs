//! Domain models mirrored by the SQL schema. Statuses are stored as text;
//! the enums own the string mapping in both directions.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use saga_events::event_type;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an order. Only the order consumer advances a row past
/// `CREATED`; the HTTP surface writes only `CREATED` and `REFUND_PENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    PaymentAuthorized,
    TicketIssued,
    Cancelled,
    RefundPending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::PaymentAuthorized => "PAYMENT_AUTHORIZED",
            OrderStatus::TicketIssued => "TICKET_ISSUED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::RefundPending => "REFUND_PENDING",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "PAYMENT_AUTHORIZED" => Ok(OrderStatus::PaymentAuthorized),
            "TICKET_ISSUED" => Ok(OrderStatus::TicketIssued),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REFUND_PENDING" => Ok(OrderStatus::RefundPending),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// The status an order moves to when the given saga event is applied.
/// Returns `None` for event types the order consumer does not advance on.
pub fn status_for_event(event_type: &str) -> Option<OrderStatus> {
    match event_type {
        event_type::PAYMENT_AUTHORIZED => Some(OrderStatus::PaymentAuthorized),
        event_type::TICKET_ISSUED => Some(OrderStatus::TicketIssued),
        event_type::PAYMENT_FAILED => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

/// Aggregate root. The itinerary columns are nullable; empty strings from
/// clients are normalized to `None` before they reach the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub travel_date: Option<NaiveDate>,
    pub travel_time: Option<String>,
    pub airline: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outbox row state. A row never regresses from `processed`; `processing` is
/// the relay's transient claim and is reset to `new` on failure or recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    New,
    Processing,
    Processed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::New => "new",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Processed => "processed",
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(OutboxStatus::New),
            "processing" => Ok(OutboxStatus::Processing),
            "processed" => Ok(OutboxStatus::Processed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// Pending publication, written in the same transaction as the domain change
/// it announces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub producer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// A fresh `new` row ready for insertion.
    pub fn new(
        event_type: &str,
        correlation_id: Option<Uuid>,
        causation_id: Option<Uuid>,
        producer: &str,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            payload,
            status: OutboxStatus::New,
            correlation_id,
            causation_id,
            producer: producer.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Consumer-side dedup record. Presence means the consumer has fully applied
/// the event and committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEvent {
    pub consumer: String,
    pub event_id: Uuid,
    pub event_type: String,
    pub correlation_id: Option<Uuid>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Authorized,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTHORIZED" => Ok(PaymentStatus::Authorized),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Child of an order, unique per `order_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Issued,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Issued => "ISSUED",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ISSUED" => Ok(TicketStatus::Issued),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

/// Child of an order, unique per `order_id`. Itinerary is copied from the
/// `PaymentAuthorized` payload, not re-read from the orders table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub travel_date: Option<NaiveDate>,
    pub travel_time: Option<String>,
    pub airline: Option<String>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_status_round_trips_through_strings() {
        for status in [
            OrderStatus::Created,
            OrderStatus::PaymentAuthorized,
            OrderStatus::TicketIssued,
            OrderStatus::Cancelled,
            OrderStatus::RefundPending,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn order_status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(OrderStatus::PaymentAuthorized).unwrap(),
            json!("PAYMENT_AUTHORIZED")
        );
        assert_eq!(
            serde_json::to_value(OrderStatus::RefundPending).unwrap(),
            json!("REFUND_PENDING")
        );
    }

    #[test]
    fn event_types_map_to_statuses() {
        assert_eq!(
            status_for_event("PaymentAuthorized"),
            Some(OrderStatus::PaymentAuthorized)
        );
        assert_eq!(
            status_for_event("TicketIssued"),
            Some(OrderStatus::TicketIssued)
        );
        assert_eq!(status_for_event("PaymentFailed"), Some(OrderStatus::Cancelled));
        assert_eq!(status_for_event("OrderCreated"), None);
        assert_eq!(status_for_event("RefundInitiated"), None);
    }

    #[test]
    fn outbox_status_round_trips() {
        for status in [
            OutboxStatus::New,
            OutboxStatus::Processing,
            OutboxStatus::Processed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert_eq!(serde_json::to_value(OutboxStatus::New).unwrap(), json!("new"));
    }

    #[test]
    fn new_outbox_event_starts_fresh() {
        let correlation = Uuid::new_v4();
        let event = OutboxEvent::new(
            "OrderCreated",
            Some(correlation),
            None,
            "order-service",
            json!({"id": correlation}),
        );

        assert_eq!(event.status, OutboxStatus::New);
        assert_eq!(event.correlation_id, Some(correlation));
        assert_eq!(event.causation_id, None);
        assert_eq!(event.producer, "order-service");
    }
}
