//! Unified SQL `OrderStore` implementation.
//!
//! SQL building is generic over `DB: SqlDatabase` (sea-query inlines bound
//! values into the string, so no backend-specific `Encode` bounds are
//! needed); only row *decoding* needs a concrete `sqlx::Database`, so that
//! part alone is generated per backend via `impl_order_store!`.

use std::marker::PhantomData;

use super::{Pool, SqlDatabase};
use crate::domain::Order;
use crate::storage::schema::Orders;
use crate::storage::Result;

pub struct SqlOrderStore<DB: SqlDatabase> {
    pool: Pool<DB>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlOrderStore<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self { pool, _marker: PhantomData }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

fn all_order_columns() -> [Orders; 18] {
    [
        Orders::Id,
        Orders::CustomerId,
        Orders::RestaurantId,
        Orders::ItemsJson,
        Orders::DeliveryLocationJson,
        Orders::SubtotalCents,
        Orders::TaxCents,
        Orders::DeliveryFeeCents,
        Orders::TotalCents,
        Orders::Status,
        Orders::Priority,
        Orders::TrackingCode,
        Orders::EstimatedDeliveryTime,
        Orders::AssignedDriverId,
        Orders::FailureReason,
        Orders::Version,
        Orders::CreatedAt,
        Orders::UpdatedAt,
    ]
}

/// Build the `INSERT` SQL for a new order. Generic over the backend: the
/// only backend-specific bit, dialect quoting/placeholders, lives in
/// `DB::build_insert`.
pub(crate) fn insert_order_sql<DB: SqlDatabase>(order: &Order) -> Result<String> {
    use sea_query::Query;

    let items_json = serde_json::to_string(&order.items)?;
    let delivery_json = serde_json::to_string(&order.delivery_location)?;
    let status = format!("{:?}", order.status);
    let priority = format!("{:?}", order.priority);

    let stmt = Query::insert()
        .into_table(Orders::Table)
        .columns(all_order_columns())
        .values_panic([
            order.id.to_string().into(),
            order.customer_id.clone().into(),
            order.restaurant_id.clone().into(),
            items_json.into(),
            delivery_json.into(),
            order.subtotal.cents().into(),
            order.tax.cents().into(),
            order.delivery_fee.cents().into(),
            order.total.cents().into(),
            status.into(),
            priority.into(),
            order.tracking_code.clone().into(),
            order.estimated_delivery_time.map(|t| t.to_rfc3339()).into(),
            order.assigned_driver_id.clone().into(),
            order.failure_reason.clone().into(),
            (order.version as i64).into(),
            order.created_at.to_rfc3339().into(),
            order.updated_at.to_rfc3339().into(),
        ])
        .to_owned();

    Ok(<DB>::build_insert(stmt))
}

/// Build the `UPDATE` SQL for an order, gated on the previous version
/// (optimistic concurrency per spec §4.2 invariant). The caller must check
/// `rows_affected() == 0` and surface `StorageError::VersionConflict`.
pub(crate) fn update_order_sql<DB: SqlDatabase>(order: &Order) -> Result<String> {
    use sea_query::{Expr, Query};

    let items_json = serde_json::to_string(&order.items)?;
    let delivery_json = serde_json::to_string(&order.delivery_location)?;
    let status = format!("{:?}", order.status);
    let priority = format!("{:?}", order.priority);

    let stmt = Query::update()
        .table(Orders::Table)
        .values([
            (Orders::ItemsJson, items_json.into()),
            (Orders::DeliveryLocationJson, delivery_json.into()),
            (Orders::SubtotalCents, order.subtotal.cents().into()),
            (Orders::TaxCents, order.tax.cents().into()),
            (Orders::DeliveryFeeCents, order.delivery_fee.cents().into()),
            (Orders::TotalCents, order.total.cents().into()),
            (Orders::Status, status.into()),
            (Orders::Priority, priority.into()),
            (Orders::TrackingCode, order.tracking_code.clone().into()),
            (
                Orders::EstimatedDeliveryTime,
                order.estimated_delivery_time.map(|t| t.to_rfc3339()).into(),
            ),
            (Orders::AssignedDriverId, order.assigned_driver_id.clone().into()),
            (Orders::FailureReason, order.failure_reason.clone().into()),
            (Orders::Version, (order.version as i64).into()),
            (Orders::UpdatedAt, order.updated_at.to_rfc3339().into()),
        ])
        .and_where(Expr::col(Orders::Id).eq(order.id.to_string()))
        .and_where(Expr::col(Orders::Version).eq((order.version as i64) - 1))
        .to_owned();

    Ok(<DB>::build_update(stmt))
}

macro_rules! impl_order_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OrderStore for SqlOrderStore<$db_type> {
            async fn get(&self, id: uuid::Uuid) -> crate::storage::Result<crate::domain::Order> {
                use sea_query::{Expr, Query};

                let stmt = Query::select()
                    .columns(all_order_columns())
                    .from(Orders::Table)
                    .and_where(Expr::col(Orders::Id).eq(id.to_string()))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| crate::storage::StorageError::NotFound(id))?;
                decode_order_row(id, row)
            }

            async fn insert(&self, order: &crate::domain::Order) -> crate::storage::Result<()> {
                let sql = insert_order_sql::<$db_type>(order)?;
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn update(&self, order: &crate::domain::Order) -> crate::storage::Result<()> {
                let sql = update_order_sql::<$db_type>(order)?;
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                if result.rows_affected() == 0 {
                    return Err(crate::storage::StorageError::VersionConflict(order.id));
                }
                Ok(())
            }
        }

        #[cfg(feature = $feature)]
        fn decode_order_row(
            id: uuid::Uuid,
            row: <<$db_type as SqlDatabase>::Database as sqlx::Database>::Row,
        ) -> crate::storage::Result<crate::domain::Order> {
            use sqlx::Row;

            use crate::domain::{DeliveryLocation, LineItem, Money, Order, OrderPriority, OrderStatus};

            let items: Vec<LineItem> = serde_json::from_str(row.get::<String, _>("items_json").as_str())?;
            let delivery_location: DeliveryLocation =
                serde_json::from_str(row.get::<String, _>("delivery_location_json").as_str())?;
            let status: OrderStatus = parse_enum(&row.get::<String, _>("status"))?;
            let priority: OrderPriority = parse_enum(&row.get::<String, _>("priority"))?;
            let estimated_delivery_time: Option<String> = row.get("estimated_delivery_time");

            Ok(Order {
                id,
                customer_id: row.get("customer_id"),
                restaurant_id: row.get("restaurant_id"),
                items,
                delivery_location,
                subtotal: Money::from_cents(row.get::<i64, _>("subtotal_cents")),
                tax: Money::from_cents(row.get::<i64, _>("tax_cents")),
                delivery_fee: Money::from_cents(row.get::<i64, _>("delivery_fee_cents")),
                total: Money::from_cents(row.get::<i64, _>("total_cents")),
                status,
                priority,
                tracking_code: row.get("tracking_code"),
                estimated_delivery_time: estimated_delivery_time.map(|s| parse_datetime(&s)).transpose()?,
                assigned_driver_id: row.get("assigned_driver_id"),
                failure_reason: row.get("failure_reason"),
                version: row.get::<i64, _>("version") as u64,
                created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
                updated_at: parse_datetime(&row.get::<String, _>("updated_at"))?,
            })
        }
    };
}

pub(crate) use impl_order_store;

/// Recover an enum from its serde `PascalCase` string rendering (how
/// `format!("{:?}", status)` comes out for these variant names).
pub(crate) fn parse_enum<T: serde::de::DeserializeOwned>(value: &str) -> crate::storage::Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|e| crate::storage::StorageError::Decode(e.to_string()))
}

pub(crate) fn parse_datetime(value: &str) -> crate::storage::Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| crate::storage::StorageError::Decode(e.to_string()))
}
