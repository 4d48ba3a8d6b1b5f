//! The order API: the saga's single command entrypoint.
//!
//! `POST /orders` is gated by a redis idempotency key and commits the order
//! row together with its `OrderCreated` outbox row in one transaction. Reads
//! go through a short-lived cache; the workflow view joins every table that
//! participates in one saga instance.

pub mod cache;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod services;
pub mod state;
