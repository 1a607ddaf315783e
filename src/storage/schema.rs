//! Table/column identifiers for sea-query, and the DDL sea-query can't
//! express (indexes, `IF NOT EXISTS`). Mirrored by `migrations/*.sql`.

use sea_query::Iden;

#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "customer_id"]
    CustomerId,
    #[iden = "restaurant_id"]
    RestaurantId,
    #[iden = "items_json"]
    ItemsJson,
    #[iden = "delivery_location_json"]
    DeliveryLocationJson,
    #[iden = "subtotal_cents"]
    SubtotalCents,
    #[iden = "tax_cents"]
    TaxCents,
    #[iden = "delivery_fee_cents"]
    DeliveryFeeCents,
    #[iden = "total_cents"]
    TotalCents,
    #[iden = "status"]
    Status,
    #[iden = "priority"]
    Priority,
    #[iden = "tracking_code"]
    TrackingCode,
    #[iden = "estimated_delivery_time"]
    EstimatedDeliveryTime,
    #[iden = "assigned_driver_id"]
    AssignedDriverId,
    #[iden = "failure_reason"]
    FailureReason,
    #[iden = "version"]
    Version,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
pub enum Sagas {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "saga_type"]
    SagaType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "data_json"]
    DataJson,
    #[iden = "steps_json"]
    StepsJson,
    #[iden = "current_step"]
    CurrentStep,
    #[iden = "total_steps"]
    TotalSteps,
    #[iden = "status"]
    Status,
    #[iden = "failure_reason"]
    FailureReason,
    #[iden = "retry_count"]
    RetryCount,
    #[iden = "max_retries"]
    MaxRetries,
    #[iden = "started_at"]
    StartedAt,
    #[iden = "completed_at"]
    CompletedAt,
    #[iden = "failed_at"]
    FailedAt,
    #[iden = "compensated_at"]
    CompensatedAt,
}

#[derive(Iden)]
pub enum OutboxEvents {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_type"]
    EventType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "payload_json"]
    PayloadJson,
    #[iden = "processed"]
    Processed,
    #[iden = "processed_at"]
    ProcessedAt,
    #[iden = "last_error"]
    LastError,
    #[iden = "retry_count"]
    RetryCount,
    #[iden = "next_attempt"]
    NextAttempt,
    #[iden = "created_at"]
    CreatedAt,
}

/// DDL run by `SqlStorage::init_schema` for a fresh database. `TEXT`/`INTEGER`
/// round-trip fine on both SQLite and Postgres, so the same statements serve
/// both backends; `migrations/0001_init.sql` mirrors this for deployments
/// that run migrations ahead of time instead of calling `init_schema`.
pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    restaurant_id TEXT NOT NULL,
    items_json TEXT NOT NULL,
    delivery_location_json TEXT NOT NULL,
    subtotal_cents INTEGER NOT NULL,
    tax_cents INTEGER NOT NULL,
    delivery_fee_cents INTEGER NOT NULL,
    total_cents INTEGER NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    tracking_code TEXT,
    estimated_delivery_time TEXT,
    assigned_driver_id TEXT,
    failure_reason TEXT,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_status_created_at ON orders(status, created_at);
CREATE INDEX IF NOT EXISTS idx_orders_customer_id ON orders(customer_id);
"#;

pub const CREATE_SAGAS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sagas (
    id TEXT PRIMARY KEY,
    saga_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    data_json TEXT NOT NULL,
    steps_json TEXT NOT NULL,
    current_step INTEGER NOT NULL,
    total_steps INTEGER NOT NULL,
    status TEXT NOT NULL,
    failure_reason TEXT,
    retry_count INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    failed_at TEXT,
    compensated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sagas_aggregate_id ON sagas(aggregate_id);
CREATE INDEX IF NOT EXISTS idx_sagas_status ON sagas(status);
"#;

pub const CREATE_OUTBOX_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT,
    last_error TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    next_attempt TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_outbox_processed_created_at ON outbox_events(processed, created_at);
CREATE INDEX IF NOT EXISTS idx_outbox_aggregate_id ON outbox_events(aggregate_id);
"#;
