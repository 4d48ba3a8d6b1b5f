//! HTTP handlers and route wiring.

use actix_web::http::header::ContentType;
use actix_web::{web, HttpRequest, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use uuid::Uuid;

use crate::dto::{CreateOrderRequest, CreateOrderResponse, RefundRequest};
use crate::error::{ApiError, Result};
use crate::idempotency::GateDecision;
use crate::services::orders;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .route("/orders", web::post().to(create_order))
        .route("/orders/{id}", web::get().to(get_order))
        .route("/orders/{id}/workflow", web::get().to(get_workflow))
        .route("/orders/{id}/refund", web::post().to(refund_order));
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("encode error: {e}"));
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// `POST /orders`: the idempotency-gated create command.
async fn create_order(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse> {
    let idempotency_key = req
        .headers()
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(key) = &idempotency_key {
        match state.gate.begin(key).await {
            GateDecision::Fresh => {}
            GateDecision::InFlight => {
                return Ok(HttpResponse::Conflict().json(json!({ "error": "concurrent request" })));
            }
            GateDecision::Replayed(stored) => {
                return Ok(HttpResponse::Conflict()
                    .insert_header(("X-Idempotency-Hit", "true"))
                    .json(replay_body(&stored)));
            }
        }
    }

    let params = body.into_inner().into_new_order()?;
    let order = orders::create_order(&state, params).await?;

    let response = CreateOrderResponse {
        order_id: order.id,
        status: order.status,
    };
    let response_body = serde_json::to_string(&response)?;

    if let Some(key) = &idempotency_key {
        state.gate.complete(key, &response_body).await;
    }

    Ok(HttpResponse::Created()
        .content_type(ContentType::json())
        .body(response_body))
}

/// The stored response replayed inside a conflict body. Stored values are
/// JSON we wrote ourselves, but a parse failure still degrades to a string.
fn replay_body(stored: &str) -> serde_json::Value {
    let original = serde_json::from_str::<serde_json::Value>(stored)
        .unwrap_or_else(|_| serde_json::Value::String(stored.to_string()));
    json!({
        "error": "request already processed",
        "original_response": original,
    })
}

/// `GET /orders/{id}`: read-through cached order lookup.
async fn get_order(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let order_id = path.into_inner();

    if let Some(cached) = state.cache.get(order_id).await {
        return Ok(no_store(HttpResponse::Ok()).json(cached));
    }

    let order = state
        .orders
        .get(order_id)
        .await?
        .ok_or(ApiError::OrderNotFound)?;

    let dto: crate::dto::OrderDto = order.into();
    state.cache.put(&dto).await;

    Ok(no_store(HttpResponse::Ok()).json(dto))
}

/// `GET /orders/{id}/workflow`: the full saga trace for one order.
async fn get_workflow(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let order_id = path.into_inner();

    let workflow = orders::load_workflow(&state, order_id)
        .await?
        .ok_or(ApiError::OrderNotFound)?;

    Ok(no_store(HttpResponse::Ok()).json(workflow))
}

/// `POST /orders/{id}/refund`. Not idempotency-gated: the status machine
/// makes the update itself safe to repeat, and each call records its own
/// `RefundInitiated` event.
async fn refund_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: Option<web::Json<RefundRequest>>,
) -> Result<HttpResponse> {
    let order_id = path.into_inner();
    let reason = body.map(|b| b.into_inner().reason).unwrap_or_default();

    orders::refund_order(&state, order_id, reason).await?;

    Ok(HttpResponse::Accepted().json(json!({ "status": "refund_initiated" })))
}

fn no_store(mut builder: actix_web::HttpResponseBuilder) -> actix_web::HttpResponseBuilder {
    builder.insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"));
    builder.insert_header(("Pragma", "no-cache"));
    builder.insert_header(("Expires", "0"));
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn health_returns_ok() {
        let app =
            test::init_service(App::new().route("/health", web::get().to(health))).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        assert_eq!(body, "OK");
    }

    #[actix_web::test]
    async fn metrics_endpoint_serves_text_format() {
        let app =
            test::init_service(App::new().route("/metrics", web::get().to(metrics))).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[::core::prelude::v1::test]
    fn replay_body_embeds_the_stored_json() {
        let stored = r#"{"order_id":"o1","status":"CREATED"}"#;
        let body = replay_body(stored);

        assert_eq!(body["error"], "request already processed");
        assert_eq!(body["original_response"]["status"], "CREATED");
    }

    #[::core::prelude::v1::test]
    fn replay_body_degrades_to_string_for_non_json() {
        let body = replay_body("not-json");
        assert_eq!(body["original_response"], "not-json");
    }
}
