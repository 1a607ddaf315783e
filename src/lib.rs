//! Order-delivery control plane: a resilient request router fronting
//! backend services, a persistent saga coordinator driving multi-step order
//! workflows, and a transactional-outbox relay shipping domain events
//! at-least-once.

pub mod bus;
pub mod circuit;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod outbox;
pub mod router;
pub mod saga;
pub mod storage;
pub mod telemetry;
