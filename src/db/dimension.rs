use super::models::{TomoId, raw_volume_path};
use super::{MAX_BIND_PARAMS, values_placeholders};
use crate::error::WarehouseError;
use sqlx::AnyConnection;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

const STAGING_COLUMNS: usize = 2;

/// Name -> generated id for every synchronized tomogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TomogramMapping {
    ids: HashMap<String, TomoId>,
    /// Rows newly created by this synchronization.
    pub inserted: u64,
}

impl TomogramMapping {
    pub fn id_of(&self, tomo_name: &str) -> Option<TomoId> {
        self.ids.get(tomo_name).copied()
    }

    pub fn as_map(&self) -> &HashMap<String, TomoId> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Additive merge of the `tomograms` dimension table.
///
/// Existing rows are never altered, so their generated ids stay stable across
/// loads. Ids are always reread after the merge; the synchronizer never assumes
/// it knows the id of a row it just inserted.
pub struct DimensionSynchronizer;

impl DimensionSynchronizer {
    pub async fn synchronize(
        conn: &mut AnyConnection,
        names: &BTreeSet<String>,
    ) -> Result<TomogramMapping, WarehouseError> {
        if names.is_empty() {
            return Ok(TomogramMapping::default());
        }

        Self::stage(conn, names).await?;

        // Known names never reach the INSERT: a conflicting row would still
        // consume a sequence value and leave a gap in the generated ids.
        // ON CONFLICT only covers a concurrent run committing the same name.
        // New rows get ids in name order.
        let inserted = sqlx::query(
            r#"
            INSERT INTO tomograms (tomo_name, raw_volume_path)
            SELECT s.tomo_name, s.raw_volume_path FROM staged_tomograms s
            WHERE NOT EXISTS (SELECT 1 FROM tomograms t WHERE t.tomo_name = s.tomo_name)
            ORDER BY s.tomo_name
            ON CONFLICT (tomo_name) DO NOTHING
            "#,
        )
        .persistent(false)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let rows: Vec<(String, TomoId)> = sqlx::query_as(
            r#"SELECT t.tomo_name, t.tomo_id
               FROM tomograms t
               JOIN staged_tomograms s ON s.tomo_name = t.tomo_name"#,
        )
        .persistent(false)
        .fetch_all(&mut *conn)
        .await?;

        sqlx::query("DROP TABLE IF EXISTS staged_tomograms")
            .execute(&mut *conn)
            .await?;

        info!(
            staged = names.len(),
            inserted, "Tomograms table synchronized"
        );
        Ok(TomogramMapping {
            ids: rows.into_iter().collect(),
            inserted,
        })
    }

    /// Load the distinct incoming names into a fresh session-local staging table.
    async fn stage(
        conn: &mut AnyConnection,
        names: &BTreeSet<String>,
    ) -> Result<(), WarehouseError> {
        sqlx::query("DROP TABLE IF EXISTS staged_tomograms")
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"CREATE TEMPORARY TABLE staged_tomograms (
                tomo_name TEXT PRIMARY KEY,
                raw_volume_path TEXT NOT NULL
            )"#,
        )
        .execute(&mut *conn)
        .await?;

        let names: Vec<&String> = names.iter().collect();
        for chunk in names.chunks(MAX_BIND_PARAMS / STAGING_COLUMNS) {
            let sql = format!(
                "INSERT INTO staged_tomograms (tomo_name, raw_volume_path) VALUES {}",
                values_placeholders(chunk.len(), STAGING_COLUMNS)
            );
            let mut query = sqlx::query(&sql).persistent(false);
            for name in chunk {
                query = query.bind(name.as_str()).bind(raw_volume_path(name));
            }
            query.execute(&mut *conn).await?;
            debug!(rows = chunk.len(), "staged tomogram names");
        }
        Ok(())
    }
}
