//! The change-data-capture core: consumes the durable `change_events` queue
//! (plus the `pg_notify` fast path), re-reads authoritative post state, and
//! projects it into the search index with bounded concurrency and per-entity
//! retry/backoff. Delivery is at-least-once with idempotent application.

pub mod content;
pub mod engine;
pub mod index;
pub mod listener;
pub mod notification;
pub mod repo;
pub mod service;
pub mod store;
pub mod worker;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
