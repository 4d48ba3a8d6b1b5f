//! The order use cases: the transactional create and refund commands and the
//! workflow read model.

use chrono::Utc;
use saga_events::{event_type, RefundInitiatedPayload};
use saga_store::{Order, OrderStatus, OutboxEvent};
use tracing::info;
use uuid::Uuid;

use crate::dto::{NewOrder, WorkflowDto};
use crate::error::Result;
use crate::state::AppState;

/// Producer tag stamped on every outbox row this service writes.
pub const PRODUCER: &str = "order-service";

/// Insert the order and its `OrderCreated` outbox row in one transaction.
/// Either both rows exist afterwards or neither does.
pub async fn create_order(state: &AppState, params: NewOrder) -> Result<Order> {
    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        user_id: params.user_id,
        status: OrderStatus::Created,
        total_amount: params.amount,
        from_city: params.from_city,
        to_city: params.to_city,
        travel_date: params.travel_date,
        travel_time: params.travel_time,
        airline: params.airline,
        created_at: now,
        updated_at: now,
    };

    let event = OutboxEvent::new(
        event_type::ORDER_CREATED,
        Some(order.id),
        None,
        PRODUCER,
        serde_json::to_value(&order)?,
    );

    let mut tx = state.pool.begin().await?;
    state.orders.insert(&mut tx, &order).await?;
    state.outbox.insert(&mut tx, &event).await?;
    tx.commit().await?;

    info!(order_id = %order.id, user_id = %order.user_id, "Order created");

    Ok(order)
}

/// Move the order to `REFUND_PENDING` and enqueue `RefundInitiated`, in one
/// transaction. Repeating the call repeats the event; the status update
/// itself is a no-op the second time.
pub async fn refund_order(state: &AppState, order_id: Uuid, reason: String) -> Result<()> {
    let payload = RefundInitiatedPayload {
        order_id,
        reason,
        timestamp: Utc::now(),
    };

    let event = OutboxEvent::new(
        event_type::REFUND_INITIATED,
        Some(order_id),
        None,
        PRODUCER,
        serde_json::to_value(&payload)?,
    );

    let mut tx = state.pool.begin().await?;
    state
        .orders
        .update_status(&mut tx, order_id, OrderStatus::RefundPending)
        .await?;
    state.outbox.insert(&mut tx, &event).await?;
    tx.commit().await?;

    info!(order_id = %order_id, "Refund initiated");

    Ok(())
}

/// Join everything one saga instance has produced, keyed by correlation id.
pub async fn load_workflow(state: &AppState, order_id: Uuid) -> Result<Option<WorkflowDto>> {
    let Some(order) = state.orders.get(order_id).await? else {
        return Ok(None);
    };

    let outbox = state.outbox.list_by_correlation(order_id).await?;
    let inbox = state.inbox.list_by_correlation(order_id).await?;
    let payment = state.payments.get_by_order(order_id).await?;
    let ticket = state.tickets.get_by_order(order_id).await?;

    Ok(Some(WorkflowDto {
        order: order.into(),
        outbox,
        inbox,
        payment,
        ticket,
    }))
}
