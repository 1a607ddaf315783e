//! Unified SQL `SagaStore` implementation. Steps are persisted as a single
//! JSON column: a saga's step list is always read/written as a whole by its
//! own coordinator, so there's no benefit to a child table over the blob
//! `snapshot_store.rs` already uses for aggregate state.

use std::marker::PhantomData;

use super::order_store::{parse_datetime, parse_enum};
use super::{Pool, SqlDatabase};
use crate::domain::Saga;
use crate::storage::schema::Sagas;
use crate::storage::Result;

pub struct SqlSagaStore<DB: SqlDatabase> {
    pool: Pool<DB>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlSagaStore<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self { pool, _marker: PhantomData }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

fn all_saga_columns() -> [Sagas; 16] {
    [
        Sagas::Id,
        Sagas::SagaType,
        Sagas::AggregateId,
        Sagas::AggregateType,
        Sagas::DataJson,
        Sagas::StepsJson,
        Sagas::CurrentStep,
        Sagas::TotalSteps,
        Sagas::Status,
        Sagas::FailureReason,
        Sagas::RetryCount,
        Sagas::MaxRetries,
        Sagas::StartedAt,
        Sagas::CompletedAt,
        Sagas::FailedAt,
        Sagas::CompensatedAt,
    ]
}

pub(crate) fn insert_saga_sql<DB: SqlDatabase>(saga: &Saga) -> Result<String> {
    use sea_query::Query;

    let status = format!("{:?}", saga.status);
    let stmt = Query::insert()
        .into_table(Sagas::Table)
        .columns(all_saga_columns())
        .values_panic([
            saga.id.to_string().into(),
            saga.saga_type.clone().into(),
            saga.aggregate_id.to_string().into(),
            saga.aggregate_type.clone().into(),
            serde_json::to_string(&saga.data)?.into(),
            serde_json::to_string(&saga.steps)?.into(),
            (saga.current_step as i64).into(),
            (saga.total_steps as i64).into(),
            status.into(),
            saga.failure_reason.clone().into(),
            (saga.retry_count as i64).into(),
            (saga.max_retries as i64).into(),
            saga.started_at.to_rfc3339().into(),
            saga.completed_at.map(|t| t.to_rfc3339()).into(),
            saga.failed_at.map(|t| t.to_rfc3339()).into(),
            saga.compensated_at.map(|t| t.to_rfc3339()).into(),
        ])
        .to_owned();

    Ok(<DB>::build_insert(stmt))
}

pub(crate) fn update_saga_sql<DB: SqlDatabase>(saga: &Saga) -> Result<String> {
    use sea_query::{Expr, Query};

    let status = format!("{:?}", saga.status);
    let stmt = Query::update()
        .table(Sagas::Table)
        .values([
            (Sagas::StepsJson, serde_json::to_string(&saga.steps)?.into()),
            (Sagas::CurrentStep, (saga.current_step as i64).into()),
            (Sagas::Status, status.into()),
            (Sagas::FailureReason, saga.failure_reason.clone().into()),
            (Sagas::RetryCount, (saga.retry_count as i64).into()),
            (Sagas::CompletedAt, saga.completed_at.map(|t| t.to_rfc3339()).into()),
            (Sagas::FailedAt, saga.failed_at.map(|t| t.to_rfc3339()).into()),
            (Sagas::CompensatedAt, saga.compensated_at.map(|t| t.to_rfc3339()).into()),
        ])
        .and_where(Expr::col(Sagas::Id).eq(saga.id.to_string()))
        .to_owned();

    Ok(<DB>::build_update(stmt))
}

macro_rules! impl_saga_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::SagaStore for SqlSagaStore<$db_type> {
            async fn get(&self, id: uuid::Uuid) -> crate::storage::Result<crate::domain::Saga> {
                use sea_query::{Expr, Query};

                let stmt = Query::select()
                    .columns(all_saga_columns())
                    .from(Sagas::Table)
                    .and_where(Expr::col(Sagas::Id).eq(id.to_string()))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| crate::storage::StorageError::NotFound(id))?;
                decode_saga_row(row)
            }

            async fn get_by_aggregate(
                &self,
                aggregate_id: uuid::Uuid,
            ) -> crate::storage::Result<Option<crate::domain::Saga>> {
                use sea_query::{Expr, Query};

                let stmt = Query::select()
                    .columns(all_saga_columns())
                    .from(Sagas::Table)
                    .and_where(Expr::col(Sagas::AggregateId).eq(aggregate_id.to_string()))
                    .order_by(Sagas::StartedAt, sea_query::Order::Desc)
                    .limit(1)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                match sqlx::query(&sql).fetch_optional(&self.pool).await? {
                    Some(row) => Ok(Some(decode_saga_row(row)?)),
                    None => Ok(None),
                }
            }

            async fn insert(&self, saga: &crate::domain::Saga) -> crate::storage::Result<()> {
                let sql = insert_saga_sql::<$db_type>(saga)?;
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn update(&self, saga: &crate::domain::Saga) -> crate::storage::Result<()> {
                let sql = update_saga_sql::<$db_type>(saga)?;
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }
        }

        #[cfg(feature = $feature)]
        fn decode_saga_row(
            row: <<$db_type as SqlDatabase>::Database as sqlx::Database>::Row,
        ) -> crate::storage::Result<crate::domain::Saga> {
            use sqlx::Row;

            use crate::domain::{Saga, SagaStatus, SagaStepRecord};

            let id: uuid::Uuid = row
                .get::<String, _>("id")
                .parse()
                .map_err(|_| crate::storage::StorageError::Decode("malformed saga id".to_string()))?;
            let aggregate_id: uuid::Uuid = row.get::<String, _>("aggregate_id").parse().map_err(|_| {
                crate::storage::StorageError::Decode("malformed aggregate id".to_string())
            })?;
            let steps: Vec<SagaStepRecord> = serde_json::from_str(row.get::<String, _>("steps_json").as_str())?;
            let data: serde_json::Value = serde_json::from_str(row.get::<String, _>("data_json").as_str())?;
            let status: SagaStatus = parse_enum(&row.get::<String, _>("status"))?;

            let completed_at: Option<String> = row.get("completed_at");
            let failed_at: Option<String> = row.get("failed_at");
            let compensated_at: Option<String> = row.get("compensated_at");

            Ok(Saga {
                id,
                saga_type: row.get("saga_type"),
                aggregate_id,
                aggregate_type: row.get("aggregate_type"),
                data,
                steps,
                current_step: row.get::<i64, _>("current_step") as usize,
                total_steps: row.get::<i64, _>("total_steps") as usize,
                status,
                failure_reason: row.get("failure_reason"),
                retry_count: row.get::<i64, _>("retry_count") as u32,
                max_retries: row.get::<i64, _>("max_retries") as u32,
                started_at: parse_datetime(&row.get::<String, _>("started_at"))?,
                completed_at: completed_at.map(|s| parse_datetime(&s)).transpose()?,
                failed_at: failed_at.map(|s| parse_datetime(&s)).transpose()?,
                compensated_at: compensated_at.map(|s| parse_datetime(&s)).transpose()?,
            })
        }
    };
}

pub(crate) use impl_saga_store;
