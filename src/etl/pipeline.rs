use super::source::LabelSnapshot;
use crate::config::Config;
use crate::db::{self, DimensionSynchronizer, FactLoader, schema};
use crate::error::WarehouseError;
use crate::secrets::{
    BootstrapResult, CredentialBootstrapper, FirstRunSeed, ReadinessGate, SecretStore,
};
use chrono::{DateTime, Utc};
use sqlx::AnyConnection;
use std::borrow::Cow;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// How a pipeline run ended without a fatal error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Loaded(LoadReport),
    /// Credentials were written on this run; the caller must re-invoke.
    SeededAwaitingRerun,
    /// Nothing was read from or written to the database.
    SourceMissing(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub tomograms_in_source: usize,
    pub tomograms_inserted: u64,
    pub tomograms_total: i64,
    pub annotations_loaded: u64,
    pub batches: usize,
    pub finished_at: DateTime<Utc>,
}

/// Readiness gate -> credentials -> connect -> one transaction holding
/// schema, dimension merge and fact replacement.
pub struct EtlPipeline<S> {
    store: S,
    config: Config,
    seed: FirstRunSeed,
}

impl<S: SecretStore> EtlPipeline<S> {
    pub fn new(store: S, config: Config, seed: FirstRunSeed) -> Self {
        Self {
            store,
            config,
            seed,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, WarehouseError> {
        info!("Starting ETL pipeline");

        ReadinessGate::from_config(&self.config.vault)
            .await_ready(&self.store)
            .await
            .into_result()?;

        let bootstrapper = CredentialBootstrapper::new(
            &self.store,
            &self.config.vault.secret_path,
            self.seed.clone(),
        );
        let creds = match bootstrapper.get_credentials().await? {
            BootstrapResult::Ready(creds) => creds,
            BootstrapResult::SeededAwaitingRerun => return Ok(RunOutcome::SeededAwaitingRerun),
        };

        let labels_path = &self.config.etl.labels_csv;
        if !labels_path.exists() {
            error!(path = %labels_path.display(), "Source data file not found. Aborting");
            return Ok(RunOutcome::SourceMissing(labels_path.clone()));
        }
        let snapshot = LabelSnapshot::from_path(labels_path)?;
        let schema_text = self.schema_text()?;

        let pool = db::connect(&self.config.database, &creds).await?;
        let mut tx = pool
            .begin()
            .await
            .map_err(WarehouseError::DatabaseConnection)?;

        let report = match self.load(&mut *tx, &schema_text, &snapshot).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                pool.close().await;
                return Err(WarehouseError::TransactionFailed(Box::new(e)));
            }
        };
        tx.commit()
            .await
            .map_err(|e| WarehouseError::TransactionFailed(Box::new(e.into())))?;
        pool.close().await;

        info!(
            tomograms_in_source = report.tomograms_in_source,
            tomograms_inserted = report.tomograms_inserted,
            tomograms_total = report.tomograms_total,
            annotations = report.annotations_loaded,
            batches = report.batches,
            "ETL pipeline completed successfully"
        );
        Ok(RunOutcome::Loaded(report))
    }

    async fn load(
        &self,
        conn: &mut AnyConnection,
        schema_text: &str,
        snapshot: &LabelSnapshot,
    ) -> Result<LoadReport, WarehouseError> {
        info!("Applying database schema");
        schema::apply(conn, schema_text).await?;

        let names = snapshot.tomogram_names();
        let mapping = DimensionSynchronizer::synchronize(conn, &names).await?;

        let records = snapshot.annotation_records(&mapping)?;
        let loader = FactLoader::new(self.config.database.driver, self.config.etl.batch_size);
        let facts = loader.replace_all(conn, &records).await?;

        let (tomograms_total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tomograms")
            .fetch_one(&mut *conn)
            .await?;

        Ok(LoadReport {
            tomograms_in_source: names.len(),
            tomograms_inserted: mapping.inserted,
            tomograms_total,
            annotations_loaded: facts.inserted,
            batches: facts.batches,
            finished_at: Utc::now(),
        })
    }

    fn schema_text(&self) -> Result<Cow<'static, str>, WarehouseError> {
        match &self.config.etl.schema_path {
            Some(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| WarehouseError::SchemaUnreadable {
                    path: path.clone(),
                    source,
                }),
            None => Ok(Cow::Borrowed(schema::bundled_schema(
                self.config.database.driver,
            ))),
        }
    }
}
