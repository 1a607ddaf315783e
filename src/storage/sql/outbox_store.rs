//! Unified SQL `OutboxStore` implementation — the relay-facing half of the
//! transactional outbox pattern. Appending an event happens inside
//! `Storage::create_order`/`Storage::apply_saga_step` (same transaction as
//! the business write, via `insert_outbox_event_sql`); this store is the
//! relay's read/mark/cleanup side.

use std::marker::PhantomData;

use chrono::Utc;

use super::order_store::parse_datetime;
use super::{Pool, SqlDatabase};
use crate::domain::NewOutboxEvent;
use crate::storage::schema::OutboxEvents;
use crate::storage::Result;

pub struct SqlOutboxStore<DB: SqlDatabase> {
    pool: Pool<DB>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlOutboxStore<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self { pool, _marker: PhantomData }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

fn all_outbox_columns() -> [OutboxEvents; 11] {
    [
        OutboxEvents::Id,
        OutboxEvents::EventType,
        OutboxEvents::AggregateId,
        OutboxEvents::AggregateType,
        OutboxEvents::PayloadJson,
        OutboxEvents::Processed,
        OutboxEvents::ProcessedAt,
        OutboxEvents::LastError,
        OutboxEvents::RetryCount,
        OutboxEvents::NextAttempt,
        OutboxEvents::CreatedAt,
    ]
}

/// Build the `INSERT` SQL appending a new outbox event (spec §4.5
/// `appendEvent`); the caller runs this against the same transaction as the
/// business write it documents.
pub(crate) fn insert_outbox_event_sql<DB: SqlDatabase>(new: &NewOutboxEvent) -> Result<String> {
    use sea_query::Query;
    use uuid::Uuid;

    let stmt = Query::insert()
        .into_table(OutboxEvents::Table)
        .columns(all_outbox_columns())
        .values_panic([
            Uuid::new_v4().to_string().into(),
            new.event_type.clone().into(),
            new.aggregate_id.to_string().into(),
            new.aggregate_type.clone().into(),
            serde_json::to_string(&new.payload)?.into(),
            false.into(),
            Option::<String>::None.into(),
            Option::<String>::None.into(),
            0i64.into(),
            Option::<String>::None.into(),
            Utc::now().to_rfc3339().into(),
        ])
        .to_owned();

    Ok(<DB>::build_insert(stmt))
}

macro_rules! impl_outbox_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OutboxStore for SqlOutboxStore<$db_type> {
            /// Poll up to `limit` unprocessed events, oldest first, due for
            /// (re)dispatch now (spec §4.6 poll step).
            async fn poll_batch(&self, limit: u32) -> crate::storage::Result<Vec<crate::domain::OutboxEvent>> {
                use sea_query::{Cond, Expr, Query};

                let now = chrono::Utc::now().to_rfc3339();
                let stmt = Query::select()
                    .columns(all_outbox_columns())
                    .from(OutboxEvents::Table)
                    .and_where(Expr::col(OutboxEvents::Processed).eq(false))
                    .cond_where(
                        Cond::any()
                            .add(Expr::col(OutboxEvents::NextAttempt).is_null())
                            .add(Expr::col(OutboxEvents::NextAttempt).lte(now)),
                    )
                    .order_by(OutboxEvents::CreatedAt, sea_query::Order::Asc)
                    .limit(limit as u64)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                rows.into_iter().map(decode_outbox_row).collect()
            }

            async fn mark_processed(&self, id: uuid::Uuid) -> crate::storage::Result<()> {
                use sea_query::{Expr, Query};

                let stmt = Query::update()
                    .table(OutboxEvents::Table)
                    .values([
                        (OutboxEvents::Processed, true.into()),
                        (OutboxEvents::ProcessedAt, chrono::Utc::now().to_rfc3339().into()),
                        (OutboxEvents::LastError, Option::<String>::None.into()),
                    ])
                    .and_where(Expr::col(OutboxEvents::Id).eq(id.to_string()))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn mark_retry(
                &self,
                id: uuid::Uuid,
                retry_count: u32,
                next_attempt: chrono::DateTime<chrono::Utc>,
                last_error: &str,
            ) -> crate::storage::Result<()> {
                use sea_query::{Expr, Query};

                let stmt = Query::update()
                    .table(OutboxEvents::Table)
                    .values([
                        (OutboxEvents::RetryCount, (retry_count as i64).into()),
                        (OutboxEvents::NextAttempt, next_attempt.to_rfc3339().into()),
                        (OutboxEvents::LastError, last_error.into()),
                    ])
                    .and_where(Expr::col(OutboxEvents::Id).eq(id.to_string()))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn cleanup(&self, older_than: chrono::DateTime<chrono::Utc>) -> crate::storage::Result<u64> {
                use sea_query::{Expr, Query};

                let stmt = Query::delete()
                    .from_table(OutboxEvents::Table)
                    .and_where(Expr::col(OutboxEvents::Processed).eq(true))
                    .and_where(Expr::col(OutboxEvents::ProcessedAt).lte(older_than.to_rfc3339()))
                    .to_owned();

                let sql = <$db_type>::build_delete(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                Ok(result.rows_affected())
            }

            async fn list_by_aggregate(&self, aggregate_id: uuid::Uuid) -> crate::storage::Result<Vec<crate::domain::OutboxEvent>> {
                use sea_query::{Expr, Query};

                let stmt = Query::select()
                    .columns(all_outbox_columns())
                    .from(OutboxEvents::Table)
                    .and_where(Expr::col(OutboxEvents::AggregateId).eq(aggregate_id.to_string()))
                    .order_by(OutboxEvents::CreatedAt, sea_query::Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                rows.into_iter().map(decode_outbox_row).collect()
            }
        }

        #[cfg(feature = $feature)]
        fn decode_outbox_row(
            row: <<$db_type as SqlDatabase>::Database as sqlx::Database>::Row,
        ) -> crate::storage::Result<crate::domain::OutboxEvent> {
            use sqlx::Row;

            use crate::domain::OutboxEvent;

            let id: uuid::Uuid = row
                .get::<String, _>("id")
                .parse()
                .map_err(|_| crate::storage::StorageError::Decode("malformed outbox id".to_string()))?;
            let aggregate_id: uuid::Uuid = row.get::<String, _>("aggregate_id").parse().map_err(|_| {
                crate::storage::StorageError::Decode("malformed aggregate id".to_string())
            })?;
            let payload: serde_json::Value = serde_json::from_str(row.get::<String, _>("payload_json").as_str())?;
            let processed_at: Option<String> = row.get("processed_at");
            let next_attempt: Option<String> = row.get("next_attempt");

            Ok(OutboxEvent {
                id,
                event_type: row.get("event_type"),
                aggregate_id,
                aggregate_type: row.get("aggregate_type"),
                payload,
                processed: row.get("processed"),
                processed_at: processed_at.map(|s| parse_datetime(&s)).transpose()?,
                last_error: row.get("last_error"),
                retry_count: row.get::<i64, _>("retry_count") as u32,
                next_attempt: next_attempt.map(|s| parse_datetime(&s)).transpose()?,
                created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
            })
        }
    };
}

pub(crate) use impl_outbox_store;
