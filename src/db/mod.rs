//! Database module: connection setup, schema, and the two load stages.
//!
//! Layout:
//! - `models.rs`: row structs and derived values
//! - `schema.rs`: bundled DDL and the schema applier
//! - `dimension.rs`: additive tomogram merge producing the name -> id mapping
//! - `facts.rs`: wholesale replacement of the annotation fact table
//!
//! All SQL uses `$N` placeholders, which both the PostgreSQL and SQLite
//! drivers accept through `sqlx::Any`.

pub mod dimension;
pub mod facts;
pub mod models;
pub mod schema;

pub use dimension::DimensionSynchronizer;
pub use facts::FactLoader;
pub use models::{AnnotationRecord, RichTomogram, TomoId, VisualizationTarget};

use crate::config::{DatabaseConfig, DatabaseDriver};
use crate::error::WarehouseError;
use crate::secrets::Credentials;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, Pool};
use tracing::info;
use url::Url;

pub type WarehousePool = Pool<Any>;

/// Lowest per-statement bind limit across supported drivers (SQLite >= 3.32).
pub(crate) const MAX_BIND_PARAMS: usize = 32_766;

/// Connection URL from resolved credentials plus configured host and port.
pub fn connection_url(cfg: &DatabaseConfig, creds: &Credentials) -> Result<String, WarehouseError> {
    match cfg.driver {
        DatabaseDriver::Postgres => {
            let mut url = Url::parse("postgres://localhost")?;
            url.set_host(Some(&cfg.host))?;
            // set_* only fail for URLs that cannot carry credentials
            let _ = url.set_port(Some(cfg.port));
            let _ = url.set_username(&creds.db_user);
            let _ = url.set_password(Some(&creds.db_password));
            url.set_path(&creds.db_name);
            Ok(url.into())
        }
        DatabaseDriver::Sqlite => Ok(format!("sqlite://{}?mode=rwc", creds.db_name)),
    }
}

/// Open a pool; failures here are reported as connection failures.
pub async fn connect(cfg: &DatabaseConfig, creds: &Credentials) -> Result<WarehousePool, WarehouseError> {
    sqlx::any::install_default_drivers();
    let url = connection_url(cfg, creds)?;

    let pool = AnyPoolOptions::new()
        .max_connections(cfg.max_connections.max(1))
        .connect(&url)
        .await
        .map_err(WarehouseError::DatabaseConnection)?;

    info!(
        driver = ?cfg.driver,
        host = %cfg.host,
        database = %creds.db_name,
        "Connected to database"
    );
    Ok(pool)
}

/// `($1, $2), ($3, $4), ...` for a multi-row `VALUES` clause.
pub(crate) fn values_placeholders(rows: usize, columns: usize) -> String {
    (0..rows)
        .map(|row| {
            let cols: Vec<String> = (1..=columns)
                .map(|col| format!("${}", row * columns + col))
                .collect();
            format!("({})", cols.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
