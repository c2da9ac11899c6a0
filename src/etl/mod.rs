//! Load path: source CSV snapshot and the transactional pipeline.

pub mod pipeline;
pub mod source;

pub use pipeline::{EtlPipeline, LoadReport, RunOutcome};
pub use source::{LabelRow, LabelSnapshot};
