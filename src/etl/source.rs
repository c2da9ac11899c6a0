use crate::db::dimension::TomogramMapping;
use crate::db::models::AnnotationRecord;
use crate::error::WarehouseError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// One labelled point from the source CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelRow {
    /// The source calls the tomogram business key `tomo_id`.
    #[serde(rename = "tomo_id")]
    pub tomo_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Parsed snapshot of the source file.
#[derive(Debug, Clone, Default)]
pub struct LabelSnapshot {
    pub rows: Vec<LabelRow>,
}

impl LabelSnapshot {
    pub fn from_path(path: &Path) -> Result<Self, WarehouseError> {
        let snapshot = Self::from_reader(std::fs::File::open(path)?)?;
        info!(
            path = %path.display(),
            rows = snapshot.rows.len(),
            "Source labels read"
        );
        Ok(snapshot)
    }

    /// Header row required; columns beyond `tomo_id`, `x`, `y`, `z` are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, WarehouseError> {
        let rows = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader)
            .deserialize()
            .collect::<Result<Vec<LabelRow>, _>>()?;
        Ok(Self { rows })
    }

    /// Tomogram identity is the distinct set of names.
    pub fn tomogram_names(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.tomo_name.clone()).collect()
    }

    /// Re-key every row against the synchronized mapping.
    pub fn annotation_records(
        &self,
        mapping: &TomogramMapping,
    ) -> Result<Vec<AnnotationRecord>, WarehouseError> {
        self.rows
            .iter()
            .map(|row| {
                let tomo_id = mapping
                    .id_of(&row.tomo_name)
                    .ok_or_else(|| WarehouseError::UnknownTomogram(row.tomo_name.clone()))?;
                Ok(AnnotationRecord {
                    tomo_id,
                    coord_x: row.x,
                    coord_y: row.y,
                    coord_z: row.z,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_required_columns_and_ignores_extras() {
        let csv = "row_id,tomo_id,z,y,x,motor_axis\n\
                   0,TS_1,10.5,20,30,1\n\
                   1, TS_2 ,1,2,3,0\n";
        let snapshot = LabelSnapshot::from_reader(csv.as_bytes()).expect("parses");
        assert_eq!(
            snapshot.rows,
            vec![
                LabelRow {
                    tomo_name: "TS_1".into(),
                    x: 30.0,
                    y: 20.0,
                    z: 10.5
                },
                LabelRow {
                    tomo_name: "TS_2".into(),
                    x: 3.0,
                    y: 2.0,
                    z: 1.0
                },
            ]
        );
    }

    #[test]
    fn distinct_names_collapse_repeats() {
        let csv = "tomo_id,x,y,z\nB,1,1,1\nA,2,2,2\nB,3,3,3\n";
        let snapshot = LabelSnapshot::from_reader(csv.as_bytes()).unwrap();
        let names: Vec<String> = snapshot.tomogram_names().into_iter().collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn malformed_coordinate_is_an_error() {
        let csv = "tomo_id,x,y,z\nA,one,2,3\n";
        assert!(matches!(
            LabelSnapshot::from_reader(csv.as_bytes()),
            Err(WarehouseError::Csv(_))
        ));
    }

    #[test]
    fn rekeying_requires_every_name_in_mapping() {
        let csv = "tomo_id,x,y,z\nA,1,2,3\n";
        let snapshot = LabelSnapshot::from_reader(csv.as_bytes()).unwrap();
        let err = snapshot
            .annotation_records(&TomogramMapping::default())
            .expect_err("unmapped name");
        assert!(matches!(err, WarehouseError::UnknownTomogram(name) if name == "A"));
    }
}
