//! Warehouse DDL and the schema applier.
//! Every statement is idempotent (`IF NOT EXISTS`); the schema runs on each load.

use crate::config::DatabaseDriver;
use crate::error::WarehouseError;
use sqlx::AnyConnection;
use tracing::debug;

/// PostgreSQL schema:
/// - `tomograms`: dimension table, `tomo_name` is the unique business key
/// - `annotations`: fact table, `tomo_id` references `tomograms`
pub const POSTGRES_SCHEMA: &str = include_str!("../../sql/schema.sql");

/// SQLite rendition of the same tables for local runs.
pub const SQLITE_SCHEMA: &str = include_str!("../../sql/schema.sqlite.sql");

pub fn bundled_schema(driver: DatabaseDriver) -> &'static str {
    match driver {
        DatabaseDriver::Postgres => POSTGRES_SCHEMA,
        DatabaseDriver::Sqlite => SQLITE_SCHEMA,
    }
}

/// Split DDL text into statements, dropping fragments that hold only comments.
pub fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Execute the full DDL on the caller's connection, normally inside the load
/// transaction, so a failing statement leaves no partial schema behind.
pub async fn apply(conn: &mut AnyConnection, schema: &str) -> Result<(), WarehouseError> {
    // sqlx::query runs one statement at a time
    for stmt in schema_statements(schema) {
        debug!(statement = stmt, "applying schema statement");
        sqlx::query(stmt).execute(&mut *conn).await?;
    }
    Ok(())
}
