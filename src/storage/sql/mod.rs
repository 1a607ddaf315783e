//! SQL storage implementations, parameterized over the `SqlDatabase` marker
//! type so the same query-building and row-mapping code serves both
//! PostgreSQL and SQLite.

mod order_store;
mod outbox_store;
mod query;
mod saga_store;

pub use order_store::SqlOrderStore;
pub use outbox_store::SqlOutboxStore;
pub use query::{Pool, SqlDatabase};
pub use saga_store::SqlSagaStore;

pub(crate) use order_store::{insert_order_sql, update_order_sql};
pub(crate) use outbox_store::insert_outbox_event_sql;
pub(crate) use saga_store::{insert_saga_sql, update_saga_sql};

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;

    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Database = sqlx::Postgres;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    pub type PostgresOrderStore = super::SqlOrderStore<Postgres>;
    pub type PostgresSagaStore = super::SqlSagaStore<Postgres>;
    pub type PostgresOutboxStore = super::SqlOutboxStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;

    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Database = sqlx::Sqlite;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    pub type SqliteOrderStore = super::SqlOrderStore<Sqlite>;
    pub type SqliteSagaStore = super::SqlSagaStore<Sqlite>;
    pub type SqliteOutboxStore = super::SqlOutboxStore<Sqlite>;
}

order_store::impl_order_store!(postgres::Postgres, "postgres");
order_store::impl_order_store!(sqlite::Sqlite, "sqlite");
saga_store::impl_saga_store!(postgres::Postgres, "postgres");
saga_store::impl_saga_store!(sqlite::Sqlite, "sqlite");
outbox_store::impl_outbox_store!(postgres::Postgres, "postgres");
outbox_store::impl_outbox_store!(sqlite::Sqlite, "sqlite");
