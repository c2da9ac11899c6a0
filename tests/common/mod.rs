#![allow(dead_code)]

use cryoet_db::config::{Config, DatabaseConfig, DatabaseDriver, EtlConfig, VaultConfig};
use cryoet_db::db::schema::{POSTGRES_SCHEMA, SQLITE_SCHEMA};
use cryoet_db::db::{self, WarehousePool};
use cryoet_db::secrets::{Credentials, FirstRunSeed, MemorySecretStore};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SECRET_PATH: &str = "cryoet";

/// Postgres-backed tests run only when this points at a disposable server.
pub const PG_HOST_VAR: &str = "CRYOET_TEST_PG_HOST";

/// Postgres tests share one database; they take this lock for their whole body.
pub static PG_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Throwaway SQLite warehouse plus source files under one temp dir.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
    credentials: Credentials,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config {
            data_dir: dir.path().join("data"),
            vault: VaultConfig {
                secret_path: SECRET_PATH.to_string(),
                health_interval_ms: 0,
                ..VaultConfig::default()
            },
            database: DatabaseConfig {
                driver: DatabaseDriver::Sqlite,
                max_connections: 1,
                ..DatabaseConfig::default()
            },
            etl: EtlConfig {
                labels_csv: dir.path().join("labels.csv"),
                schema_path: None,
                batch_size: 10_000,
            },
            ..Config::default()
        };
        let credentials = Credentials {
            db_user: "cryo".to_string(),
            db_password: "unused-by-sqlite".to_string(),
            db_name: dir.path().join("cryoet.sqlite").display().to_string(),
        };
        Self {
            dir,
            config,
            credentials,
        }
    }

    /// A fixture on the Postgres server named by `CRYOET_TEST_PG_HOST`, with
    /// both warehouse tables dropped. `None` when the variable is unset.
    ///
    /// `CRYOET_TEST_PG_PORT`, `_USER`, `_PASSWORD` and `_DB` default to
    /// `5432`, `postgres`, `postgres` and `postgres`.
    pub async fn postgres() -> Option<Self> {
        let host = std::env::var(PG_HOST_VAR).ok().filter(|h| !h.is_empty())?;
        let var = |suffix: &str, default: &str| {
            std::env::var(format!("CRYOET_TEST_PG_{suffix}")).unwrap_or_else(|_| default.to_string())
        };

        let mut fixture = Self::new();
        fixture.config.database = DatabaseConfig {
            driver: DatabaseDriver::Postgres,
            host,
            port: var("PORT", "5432").parse().expect("numeric CRYOET_TEST_PG_PORT"),
            max_connections: 1,
        };
        fixture.credentials = Credentials {
            db_user: var("USER", "postgres"),
            db_password: var("PASSWORD", "postgres"),
            db_name: var("DB", "postgres"),
        };

        let pool = fixture.pool().await;
        sqlx::query("DROP TABLE IF EXISTS annotations, tomograms CASCADE")
            .execute(&pool)
            .await
            .expect("reset postgres tables");
        pool.close().await;
        Some(fixture)
    }

    pub fn driver(&self) -> DatabaseDriver {
        self.config.database.driver
    }

    /// SQLite file location; meaningless for Postgres fixtures.
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("cryoet.sqlite")
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    /// Bundled schema for this fixture's driver with `coord_x >= 0` enforced.
    pub fn schema_rejecting_negative_x(&self) -> String {
        let (schema, column) = match self.driver() {
            DatabaseDriver::Postgres => (POSTGRES_SCHEMA, "coord_x DOUBLE PRECISION NOT NULL,"),
            DatabaseDriver::Sqlite => (SQLITE_SCHEMA, "coord_x REAL NOT NULL,"),
        };
        assert!(schema.contains(column), "bundled schema changed");
        schema.replace(
            column,
            &column.replace(" NOT NULL,", " NOT NULL CHECK (coord_x >= 0),"),
        )
    }

    pub fn seed(&self) -> FirstRunSeed {
        let creds = self.credentials();
        FirstRunSeed {
            db_user: Some(creds.db_user),
            db_password: Some(creds.db_password),
            db_name: Some(creds.db_name),
        }
    }

    /// A store that already holds this fixture's credentials.
    pub fn seeded_store(&self) -> MemorySecretStore {
        MemorySecretStore::with_document(SECRET_PATH, self.credentials())
    }

    /// Write the labels CSV from `(tomo_name, x, y, z)` rows.
    pub fn write_labels(&self, rows: &[(&str, f64, f64, f64)]) {
        write_labels(&self.config.etl.labels_csv, rows);
    }

    pub fn write_schema(&mut self, ddl: &str) {
        let path = self.dir.path().join("schema.sql");
        std::fs::write(&path, ddl).expect("write schema");
        self.config.etl.schema_path = Some(path);
    }

    pub async fn pool(&self) -> WarehousePool {
        db::connect(&self.config.database, &self.credentials)
            .await
            .expect("open fixture database")
    }

    pub async fn tomograms(&self) -> Vec<(i64, String, String)> {
        let pool = self.pool().await;
        let rows = sqlx::query_as(
            "SELECT tomo_id, tomo_name, raw_volume_path FROM tomograms ORDER BY tomo_id",
        )
        .fetch_all(&pool)
        .await
        .expect("read tomograms");
        pool.close().await;
        rows
    }

    pub async fn annotations(&self) -> Vec<(i64, i64, f64, f64, f64)> {
        let pool = self.pool().await;
        let rows = sqlx::query_as(
            "SELECT annotation_id, tomo_id, coord_x, coord_y, coord_z FROM annotations ORDER BY annotation_id",
        )
        .fetch_all(&pool)
        .await
        .expect("read annotations");
        pool.close().await;
        rows
    }
}

pub fn write_labels(path: &Path, rows: &[(&str, f64, f64, f64)]) {
    let mut csv = String::from("row_id,tomo_id,z,y,x\n");
    for (i, (name, x, y, z)) in rows.iter().enumerate() {
        writeln!(csv, "{i},{name},{z},{y},{x}").expect("format row");
    }
    std::fs::write(path, csv).expect("write labels");
}

/// `count` points for one tomogram.
pub fn points(name: &'static str, count: usize) -> Vec<(&'static str, f64, f64, f64)> {
    (0..count)
        .map(|i| (name, i as f64, (i * 2) as f64, (i % 7) as f64))
        .collect()
}
