//! Read-only lookups backing the analysis commands.

use crate::config::Config;
use crate::db::{self, RichTomogram, VisualizationTarget, WarehousePool};
use crate::error::WarehouseError;
use crate::secrets::{ReadinessGate, SecretStore, resolve_existing};

/// Owns its pool; shares nothing with the load path beyond credentials.
#[derive(Clone)]
pub struct QueryService {
    pool: WarehousePool,
}

impl QueryService {
    pub fn new(pool: WarehousePool) -> Self {
        Self { pool }
    }

    /// Gate on the secret store, resolve existing credentials and connect.
    /// Never seeds the store: a missing secret means no load has run yet.
    pub async fn connect<S: SecretStore>(store: &S, config: &Config) -> Result<Self, WarehouseError> {
        ReadinessGate::from_config(&config.vault)
            .await_ready(store)
            .await
            .into_result()?;
        let creds = resolve_existing(store, &config.vault.secret_path).await?;
        let pool = db::connect(&config.database, &creds).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &WarehousePool {
        &self.pool
    }

    /// Zero for unknown tomograms and for tomograms without annotations.
    pub async fn count_annotations(&self, tomo_name: &str) -> Result<i64, WarehouseError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(a.annotation_id)
               FROM annotations a
               JOIN tomograms t ON a.tomo_id = t.tomo_id
               WHERE t.tomo_name = $1"#,
        )
        .bind(tomo_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Tomograms with strictly more than `min_count` annotations, most first.
    pub async fn find_rich(&self, min_count: i64) -> Result<Vec<RichTomogram>, WarehouseError> {
        let rows = sqlx::query_as::<_, RichTomogram>(
            r#"SELECT t.tomo_name, COUNT(a.annotation_id) AS annotation_count
               FROM tomograms t
               JOIN annotations a ON t.tomo_id = a.tomo_id
               GROUP BY t.tomo_name
               HAVING COUNT(a.annotation_id) > $1
               ORDER BY annotation_count DESC, t.tomo_name"#,
        )
        .bind(min_count)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn lookup_for_visualization(
        &self,
        annotation_id: i64,
    ) -> Result<Option<VisualizationTarget>, WarehouseError> {
        let target = sqlx::query_as::<_, VisualizationTarget>(
            r#"SELECT t.raw_volume_path, a.coord_x, a.coord_y, a.coord_z
               FROM annotations a
               JOIN tomograms t ON a.tomo_id = t.tomo_id
               WHERE a.annotation_id = $1"#,
        )
        .bind(annotation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
