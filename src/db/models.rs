use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::{Path, PathBuf};

/// Generated id of a `tomograms` row.
pub type TomoId = i64;

/// Storage location of a tomogram's raw volume, derived from its name alone.
pub fn raw_volume_path(tomo_name: &str) -> String {
    format!("volumes/{tomo_name}.mrc")
}

/// One row of the fact table as written by a load, keyed by generated tomogram id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationRecord {
    pub tomo_id: TomoId,
    pub coord_x: f64,
    pub coord_y: f64,
    pub coord_z: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RichTomogram {
    pub tomo_name: String,
    pub annotation_count: i64,
}

/// Everything needed to render one annotation on its tomogram slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VisualizationTarget {
    pub raw_volume_path: String,
    pub coord_x: f64,
    pub coord_y: f64,
    pub coord_z: f64,
}

impl VisualizationTarget {
    /// Z slice holding the annotation.
    pub fn slice_index(&self) -> i64 {
        self.coord_z.round() as i64
    }

    /// Preprocessed `.npy` array for the raw volume, under `data_dir`.
    pub fn volume_array_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(Path::new(&self.raw_volume_path).with_extension("npy"))
    }
}
