use super::models::AnnotationRecord;
use super::{MAX_BIND_PARAMS, values_placeholders};
use crate::config::DatabaseDriver;
use crate::error::WarehouseError;
use sqlx::AnyConnection;
use tracing::{debug, info};

const ANNOTATION_COLUMNS: usize = 4;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactLoadSummary {
    pub inserted: u64,
    pub batches: usize,
}

/// Snapshot replacement of the `annotations` fact table.
///
/// Must run on the same transaction as the dimension merge: a record whose
/// `tomo_id` violates the foreign key fails the statement, and the caller
/// rolls everything back.
pub struct FactLoader {
    driver: DatabaseDriver,
    batch_size: usize,
}

impl FactLoader {
    pub fn new(driver: DatabaseDriver, batch_size: usize) -> Self {
        Self {
            driver,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn replace_all(
        &self,
        conn: &mut AnyConnection,
        records: &[AnnotationRecord],
    ) -> Result<FactLoadSummary, WarehouseError> {
        info!("Clearing old annotations");
        self.clear(conn).await?;

        info!(count = records.len(), "Loading new annotations");
        let rows_per_statement = self.batch_size.min(MAX_BIND_PARAMS / ANNOTATION_COLUMNS);
        let mut inserted = 0;
        let mut batches = 0;

        for (batch_no, batch) in records.chunks(self.batch_size).enumerate() {
            for chunk in batch.chunks(rows_per_statement) {
                inserted += Self::insert_rows(conn, chunk).await?;
            }
            batches += 1;
            debug!(batch = batch_no + 1, rows = batch.len(), "annotation batch written");
        }

        Ok(FactLoadSummary { inserted, batches })
    }

    /// Remove every annotation and restart the generated id sequence.
    async fn clear(&self, conn: &mut AnyConnection) -> Result<(), WarehouseError> {
        match self.driver {
            DatabaseDriver::Postgres => {
                sqlx::query("TRUNCATE TABLE annotations RESTART IDENTITY CASCADE")
                    .execute(&mut *conn)
                    .await?;
            }
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM annotations")
                    .execute(&mut *conn)
                    .await?;
                // sqlite_sequence only exists once an AUTOINCREMENT table has been created
                let (has_sequence,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
                )
                .fetch_one(&mut *conn)
                .await?;
                if has_sequence > 0 {
                    sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'annotations'")
                        .execute(&mut *conn)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn insert_rows(
        conn: &mut AnyConnection,
        rows: &[AnnotationRecord],
    ) -> Result<u64, WarehouseError> {
        let sql = format!(
            "INSERT INTO annotations (tomo_id, coord_x, coord_y, coord_z) VALUES {}",
            values_placeholders(rows.len(), ANNOTATION_COLUMNS)
        );
        // statement text varies with the chunk length
        let mut query = sqlx::query(&sql).persistent(false);
        for row in rows {
            query = query
                .bind(row.tomo_id)
                .bind(row.coord_x)
                .bind(row.coord_y)
                .bind(row.coord_z);
        }
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }
}
