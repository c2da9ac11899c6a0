use reqwest::StatusCode;
use sqlx::Error as SqlxError;
use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum WarehouseError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("malformed secret document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Secret store is not available after {attempts} health checks")]
    SecretStoreUnavailable { attempts: u32 },

    #[error(
        "first run requires {} to be set for secret store initialization",
        missing.join(", ")
    )]
    MissingFirstRunConfig { missing: Vec<&'static str> },

    #[error("could not read secret at '{path}': upstream status {status}")]
    SecretRead { path: String, status: StatusCode },

    #[error("could not write secret at '{path}': {reason}")]
    SecretWrite { path: String, reason: String },

    #[error("no credentials found at '{path}'; run `cryoet-db load` first to initialize them")]
    CredentialsNotInitialized { path: String },

    #[error("Database connection failed: {0}")]
    DatabaseConnection(#[source] SqlxError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("annotation references unknown tomogram '{0}'")]
    UnknownTomogram(String),

    #[error("load transaction rolled back: {0}")]
    TransactionFailed(#[source] Box<WarehouseError>),

    #[error("schema file not readable at {path}: {source}")]
    SchemaUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<figment::Error> for WarehouseError {
    fn from(e: figment::Error) -> Self {
        WarehouseError::Config(Box::new(e))
    }
}

impl WarehouseError {
    /// True for failures an operator fixes by bringing the database up,
    /// as opposed to bad data or bad secrets.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            WarehouseError::DatabaseConnection(_) => true,
            WarehouseError::TransactionFailed(inner) => inner.is_connection_failure(),
            _ => false,
        }
    }
}
