//! SQL database abstraction trait.
//!
//! Abstracts over PostgreSQL and SQLite by providing the underlying
//! `sqlx::Database` and the dialect-specific sea-query builder.

/// Marker type for a concrete SQL backend.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The `sqlx::Database` this backend talks.
    type Database: sqlx::Database;

    fn build_select(stmt: sea_query::SelectStatement) -> String;
    fn build_insert(stmt: sea_query::InsertStatement) -> String;
    fn build_update(stmt: sea_query::UpdateStatement) -> String;
    fn build_delete(stmt: sea_query::DeleteStatement) -> String;
}

/// Connection pool for a given `SqlDatabase` marker.
pub type Pool<DB> = sqlx::Pool<<DB as SqlDatabase>::Database>;
