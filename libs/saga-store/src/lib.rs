//! Persistence layer for the order saga: domain models and Postgres
//! repositories over the five tables (`orders`, `outbox`, `inbox_events`,
//! `payments`, `tickets`).
//!
//! Repositories hold a `PgPool` for pool-scoped reads. Every write that must
//! be atomic with other writes takes `&mut Transaction<'_, Postgres>`
//! explicitly; the caller owns the transaction boundary.

mod error;
mod models;
mod pool;

pub mod inbox;
pub mod orders;
pub mod outbox;
pub mod payments;
pub mod tickets;

pub use error::{StoreError, StoreResult};
pub use inbox::InboxRepository;
pub use models::{
    status_for_event, InboxEvent, Order, OrderStatus, OutboxEvent, OutboxStatus, Payment,
    PaymentStatus, Ticket, TicketStatus,
};
pub use orders::OrderRepository;
pub use outbox::OutboxRepository;
pub use payments::PaymentRepository;
pub use pool::connect;
pub use tickets::TicketRepository;
