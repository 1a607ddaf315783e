//! The data model shared by the router, saga coordinator, and outbox relay (spec §3).

mod order;
mod outbox;
mod saga;

pub use order::{DeliveryLocation, LineItem, Money, Order, OrderPriority, OrderStatus};
pub use outbox::{NewOutboxEvent, OutboxEvent, OutboxEventType};
pub use saga::{Saga, SagaStatus, SagaStepRecord, SagaType, StepStatus};
