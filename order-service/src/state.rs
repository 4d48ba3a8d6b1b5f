use redis::aio::ConnectionManager;
use saga_store::{
    InboxRepository, OrderRepository, OutboxRepository, PaymentRepository, TicketRepository,
};
use sqlx::PgPool;

use crate::cache::OrderCache;
use crate::idempotency::IdempotencyGate;

/// Shared per-process state handed to every request handler.
pub struct AppState {
    pub pool: PgPool,
    pub orders: OrderRepository,
    pub outbox: OutboxRepository,
    pub inbox: InboxRepository,
    pub payments: PaymentRepository,
    pub tickets: TicketRepository,
    pub cache: OrderCache,
    pub gate: IdempotencyGate,
}

impl AppState {
    pub fn new(pool: PgPool, redis: ConnectionManager) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            outbox: OutboxRepository::new(pool.clone()),
            inbox: InboxRepository::new(pool.clone()),
            payments: PaymentRepository::new(pool.clone()),
            tickets: TicketRepository::new(pool.clone()),
            cache: OrderCache::new(redis.clone()),
            gate: IdempotencyGate::new(redis),
            pool,
        }
    }
}
