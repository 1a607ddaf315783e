//! Outbox Writer and Relay (spec §4.5, §4.6).
//!
//! There is no separate "writer" type: `appendEvent` is
//! [`crate::domain::NewOutboxEvent::new`] plus one of
//! [`crate::storage::TransactionalStorage::create_order_with_saga`] /
//! [`crate::storage::TransactionalStorage::apply_saga_step`], which append
//! events in the same DB transaction as the business write that produced
//! them. This module is the Relay: the background service that drains those
//! events to the bus.

mod relay;

pub use relay::{OutboxRelay, RelayError};
