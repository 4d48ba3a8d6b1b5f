//! Request and response shapes for the HTTP surface.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use saga_store::{InboxEvent, Order, OrderStatus, OutboxEvent, Payment, Ticket};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub airline: Option<String>,
}

/// Validated order parameters, itinerary normalized (empty strings dropped,
/// date parsed).
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub amount: Decimal,
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub travel_date: Option<NaiveDate>,
    pub travel_time: Option<String>,
    pub airline: Option<String>,
}

impl CreateOrderRequest {
    pub fn into_new_order(self) -> Result<NewOrder, ApiError> {
        if self.user_id.trim().is_empty() {
            return Err(ApiError::Validation("user_id must not be empty".into()));
        }

        let travel_date = match self.date.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|_| {
                ApiError::Validation(format!("invalid date: {raw}, expected YYYY-MM-DD"))
            })?),
            None => None,
        };

        Ok(NewOrder {
            user_id: self.user_id,
            amount: self.amount,
            from_city: none_if_empty(self.from),
            to_city: none_if_empty(self.to),
            travel_date,
            travel_time: none_if_empty(self.time),
            airline: none_if_empty(self.airline),
        })
    }
}

fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDto {
    pub id: Uuid,
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub travel_date: Option<NaiveDate>,
    pub travel_time: Option<String>,
    pub airline: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            status: order.status,
            from_city: order.from_city,
            to_city: order.to_city,
            travel_date: order.travel_date,
            travel_time: order.travel_time,
            airline: order.airline,
            created_at: order.created_at,
        }
    }
}

/// Everything one saga instance has touched, for debugging.
#[derive(Debug, Serialize)]
pub struct WorkflowDto {
    pub order: OrderDto,
    pub outbox: Vec<OutboxEvent>,
    pub inbox: Vec<InboxEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_parses_spec_body() {
        let raw = json!({
            "user_id": "u1",
            "amount": 100,
            "from": "A",
            "to": "B",
            "date": "2025-01-01",
            "time": "10:00",
            "airline": "X"
        });

        let req: CreateOrderRequest = serde_json::from_value(raw).unwrap();
        let order = req.into_new_order().unwrap();

        assert_eq!(order.user_id, "u1");
        assert_eq!(order.amount, Decimal::new(100, 0));
        assert_eq!(order.from_city.as_deref(), Some("A"));
        assert_eq!(order.travel_date.unwrap().to_string(), "2025-01-01");
    }

    #[test]
    fn itinerary_is_optional() {
        let raw = json!({"user_id": "u1", "amount": 42.5});
        let req: CreateOrderRequest = serde_json::from_value(raw).unwrap();
        let order = req.into_new_order().unwrap();

        assert!(order.from_city.is_none());
        assert!(order.travel_date.is_none());
    }

    #[test]
    fn empty_strings_normalize_to_none() {
        let raw = json!({"user_id": "u1", "amount": 1, "from": "", "date": ""});
        let order = serde_json::from_value::<CreateOrderRequest>(raw)
            .unwrap()
            .into_new_order()
            .unwrap();

        assert!(order.from_city.is_none());
        assert!(order.travel_date.is_none());
    }

    #[test]
    fn bad_date_is_a_validation_error() {
        let raw = json!({"user_id": "u1", "amount": 1, "date": "01/01/2025"});
        let err = serde_json::from_value::<CreateOrderRequest>(raw)
            .unwrap()
            .into_new_order()
            .unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn blank_user_id_is_rejected() {
        let raw = json!({"user_id": "  ", "amount": 1});
        let err = serde_json::from_value::<CreateOrderRequest>(raw)
            .unwrap()
            .into_new_order()
            .unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn create_response_shape() {
        let response = CreateOrderResponse {
            order_id: Uuid::nil(),
            status: OrderStatus::Created,
        };
        let raw = serde_json::to_value(&response).unwrap();

        assert_eq!(raw["status"], json!("CREATED"));
        assert!(raw["order_id"].is_string());
    }
}
