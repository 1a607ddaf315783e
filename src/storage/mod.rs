//! Persistence for orders, sagas, and the outbox.
//!
//! `OrderStore`/`SagaStore`/`OutboxStore` are the per-aggregate interfaces
//! (implemented by `sql::SqlOrderStore<DB>` and friends, or by `mock` for
//! tests). `SqlStorage<DB>` additionally exposes the cross-aggregate
//! transactional writes the order-creation and saga-step flows need: an
//! order, its originating saga, and an outbox event must commit together or
//! not at all (spec §4.2, §4.5).

pub mod mock;
pub mod schema;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod sql;

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, Order, OutboxEvent, Saga};
use crate::error::ControlPlaneError;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record {0} not found")]
    NotFound(Uuid),
    #[error("optimistic concurrency conflict on order {0}")]
    VersionConflict(Uuid),
    #[cfg(any(feature = "postgres", feature = "sqlite"))]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<StorageError> for ControlPlaneError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ControlPlaneError::NotFound(format!("{id}")),
            StorageError::VersionConflict(id) => {
                ControlPlaneError::Conflict(format!("order {id} was modified concurrently, retry with a fresh read"))
            }
            other => ControlPlaneError::Internal(other.to_string()),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Order>;
    async fn insert(&self, order: &Order) -> Result<()>;
    /// Update gated on `order.version - 1` matching the stored version;
    /// returns `StorageError::VersionConflict` otherwise.
    async fn update(&self, order: &Order) -> Result<()>;
}

#[async_trait]
pub trait SagaStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Saga>;
    /// Most recently started saga for this aggregate, if any (used to
    /// resume or no-op on duplicate saga-start requests).
    async fn get_by_aggregate(&self, aggregate_id: Uuid) -> Result<Option<Saga>>;
    async fn insert(&self, saga: &Saga) -> Result<()>;
    async fn update(&self, saga: &Saga) -> Result<()>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Unprocessed events due now, oldest first, capped at `limit` (spec
    /// §4.6 poll step).
    async fn poll_batch(&self, limit: u32) -> Result<Vec<OutboxEvent>>;
    async fn mark_processed(&self, id: Uuid) -> Result<()>;
    async fn mark_retry(
        &self,
        id: Uuid,
        retry_count: u32,
        next_attempt: DateTime<Utc>,
        last_error: &str,
    ) -> Result<()>;
    /// Delete processed events older than `older_than`; returns rows removed
    /// (spec §4.6 hourly cleanup).
    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64>;
    /// All events appended for one aggregate, oldest first (gateway event
    /// history endpoint; not part of the relay's own hot path).
    async fn list_by_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEvent>>;
}

/// The composite surface the saga coordinator and outbox relay need,
/// independent of whether the backing stores are in-memory or SQL-backed:
/// reads go through the per-aggregate stores, but the two writes that must
/// span aggregates (order+saga+event on creation, saga+order+events on a
/// step) go through one atomic call.
#[async_trait]
pub trait TransactionalStorage: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<Order>;
    async fn get_saga(&self, id: Uuid) -> Result<Saga>;
    async fn get_saga_by_aggregate(&self, aggregate_id: Uuid) -> Result<Option<Saga>>;
    async fn poll_outbox(&self, limit: u32) -> Result<Vec<OutboxEvent>>;
    async fn mark_outbox_processed(&self, id: Uuid) -> Result<()>;
    async fn mark_outbox_retry(&self, id: Uuid, retry_count: u32, next_attempt: DateTime<Utc>, last_error: &str) -> Result<()>;
    async fn cleanup_outbox(&self, older_than: DateTime<Utc>) -> Result<u64>;
    async fn list_outbox_for_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEvent>>;
    async fn create_order_with_saga(&self, order: &Order, event: &NewOutboxEvent, saga: &Saga) -> Result<()>;
    async fn apply_saga_step(&self, saga: &Saga, order: Option<&Order>, events: &[NewOutboxEvent]) -> Result<()>;
    /// Plain order field update (gateway `PUT /orders/{id}`), outside any
    /// saga step — gated on optimistic-concurrency version like any other
    /// order write.
    async fn update_order(&self, order: &Order) -> Result<()>;
    /// Order update plus one outbox event in the same transaction, for
    /// gateway-triggered writes that aren't part of a saga step (cancel).
    async fn update_order_with_event(&self, order: &Order, event: &NewOutboxEvent) -> Result<()>;
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub struct SqlStorage<DB: sql::SqlDatabase> {
    pool: sql::Pool<DB>,
    _marker: PhantomData<DB>,
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
impl<DB: sql::SqlDatabase> SqlStorage<DB> {
    pub fn new(pool: sql::Pool<DB>) -> Self {
        Self { pool, _marker: PhantomData }
    }

    pub fn orders(&self) -> sql::SqlOrderStore<DB> {
        sql::SqlOrderStore::new(self.pool.clone())
    }

    pub fn sagas(&self) -> sql::SqlSagaStore<DB> {
        sql::SqlSagaStore::new(self.pool.clone())
    }

    pub fn outbox(&self) -> sql::SqlOutboxStore<DB> {
        sql::SqlOutboxStore::new(self.pool.clone())
    }

    /// Create the orders/sagas/outbox_events tables and their indexes if
    /// they don't already exist. Each `CREATE` runs as its own statement
    /// (Postgres's extended query protocol doesn't accept a `;`-joined
    /// batch the way SQLite's does).
    pub async fn init_schema(&self) -> Result<()> {
        for ddl in [
            schema::CREATE_ORDERS_TABLE,
            schema::CREATE_SAGAS_TABLE,
            schema::CREATE_OUTBOX_EVENTS_TABLE,
        ] {
            for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Insert a new order together with the saga it kicks off and the
    /// `ORDER_CREATED` outbox event, in one transaction (spec §4.2 step 5,
    /// §4.5 "same transaction as the business write").
    pub async fn create_order_with_saga(&self, order: &Order, event: &NewOutboxEvent, saga: &Saga) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let order_sql = sql::insert_order_sql::<DB>(order)?;
        sqlx::query(&order_sql).execute(&mut *tx).await?;

        let event_sql = sql::insert_outbox_event_sql::<DB>(event)?;
        sqlx::query(&event_sql).execute(&mut *tx).await?;

        let saga_sql = sql::insert_saga_sql::<DB>(saga)?;
        sqlx::query(&saga_sql).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Persist a saga-step transition, together with any order mutation and
    /// outbox events it produced, atomically (spec §4.4/§4.5).
    pub async fn apply_saga_step(
        &self,
        saga: &Saga,
        order: Option<&Order>,
        events: &[NewOutboxEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let saga_sql = sql::update_saga_sql::<DB>(saga)?;
        sqlx::query(&saga_sql).execute(&mut *tx).await?;

        if let Some(order) = order {
            let order_sql = sql::update_order_sql::<DB>(order)?;
            let result = sqlx::query(&order_sql).execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                return Err(StorageError::VersionConflict(order.id));
            }
        }

        for event in events {
            let event_sql = sql::insert_outbox_event_sql::<DB>(event)?;
            sqlx::query(&event_sql).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Update an order together with one outbox event it produced, in one
    /// transaction (gateway cancel flow).
    pub async fn update_order_with_event(&self, order: &Order, event: &NewOutboxEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let order_sql = sql::update_order_sql::<DB>(order)?;
        let result = sqlx::query(&order_sql).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::VersionConflict(order.id));
        }

        let event_sql = sql::insert_outbox_event_sql::<DB>(event)?;
        sqlx::query(&event_sql).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
#[async_trait]
impl<DB: sql::SqlDatabase> TransactionalStorage for SqlStorage<DB> {
    async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders().get(id).await
    }

    async fn get_saga(&self, id: Uuid) -> Result<Saga> {
        self.sagas().get(id).await
    }

    async fn get_saga_by_aggregate(&self, aggregate_id: Uuid) -> Result<Option<Saga>> {
        self.sagas().get_by_aggregate(aggregate_id).await
    }

    async fn poll_outbox(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        self.outbox().poll_batch(limit).await
    }

    async fn mark_outbox_processed(&self, id: Uuid) -> Result<()> {
        self.outbox().mark_processed(id).await
    }

    async fn mark_outbox_retry(&self, id: Uuid, retry_count: u32, next_attempt: DateTime<Utc>, last_error: &str) -> Result<()> {
        self.outbox().mark_retry(id, retry_count, next_attempt, last_error).await
    }

    async fn cleanup_outbox(&self, older_than: DateTime<Utc>) -> Result<u64> {
        self.outbox().cleanup(older_than).await
    }

    async fn list_outbox_for_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEvent>> {
        self.outbox().list_by_aggregate(aggregate_id).await
    }

    async fn create_order_with_saga(&self, order: &Order, event: &NewOutboxEvent, saga: &Saga) -> Result<()> {
        SqlStorage::create_order_with_saga(self, order, event, saga).await
    }

    async fn apply_saga_step(&self, saga: &Saga, order: Option<&Order>, events: &[NewOutboxEvent]) -> Result<()> {
        SqlStorage::apply_saga_step(self, saga, order, events).await
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.orders().update(order).await
    }

    async fn update_order_with_event(&self, order: &Order, event: &NewOutboxEvent) -> Result<()> {
        SqlStorage::update_order_with_event(self, order, event).await
    }
}
