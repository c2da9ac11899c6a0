//! Layered runtime configuration.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. `cryoet.toml` (or the file given on the command line)
//! 3. Legacy deployment variables `VAULT_ADDR`, `VAULT_TOKEN`, `DB_HOST`
//! 4. `CRYOET_*` environment variables, `__` separating sections
//!    (`CRYOET_VAULT__HEALTH_MAX_ATTEMPTS` -> `vault.health_max_attempts`)

use crate::error::WarehouseError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "cryoet.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub loglevel: String,
    /// Root for derived volume arrays used by visualization lookups.
    pub data_dir: PathBuf,
    pub vault: VaultConfig,
    pub database: DatabaseConfig,
    pub etl: EtlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub addr: String,
    pub token: String,
    /// KV v2 engine mount point.
    pub mount: String,
    pub secret_path: String,
    pub health_max_attempts: u32,
    pub health_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Postgres,
    /// Local runs and tests; `db_name` is a file path and user/password are unused.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub labels_csv: PathBuf,
    /// External DDL applied verbatim; the bundled schema for the driver when unset.
    pub schema_path: Option<PathBuf>,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            data_dir: PathBuf::from("/app/data"),
            vault: VaultConfig::default(),
            database: DatabaseConfig::default(),
            etl: EtlConfig::default(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: "http://vault:8200".to_string(),
            token: "root".to_string(),
            mount: "secret".to_string(),
            secret_path: "cryoet".to_string(),
            health_max_attempts: 5,
            health_interval_ms: 2000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Postgres,
            host: "db".to_string(),
            port: 5432,
            max_connections: 5,
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            labels_csv: PathBuf::from("/app/data/labels.csv"),
            schema_path: None,
            batch_size: crate::db::facts::DEFAULT_BATCH_SIZE,
        }
    }
}

impl VaultConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

impl Config {
    /// Build the provider chain. `file` replaces the default `cryoet.toml` lookup.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let path = file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(
                Env::raw()
                    .only(&["VAULT_ADDR", "VAULT_TOKEN", "DB_HOST"])
                    .map(|key| match key.as_str().to_ascii_uppercase().as_str() {
                        "VAULT_ADDR" => "vault.addr".into(),
                        "VAULT_TOKEN" => "vault.token".into(),
                        "DB_HOST" => "database.host".into(),
                        _ => key.into(),
                    }),
            )
            .merge(Env::prefixed("CRYOET_").split("__"))
    }

    pub fn load(file: Option<&Path>) -> Result<Self, WarehouseError> {
        Ok(Self::figment(file).extract()?)
    }
}
