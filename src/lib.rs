pub mod config;
pub mod db;
pub mod error;
pub mod etl;
pub mod query;
pub mod secrets;

pub use config::Config;
pub use error::WarehouseError;
pub use etl::{EtlPipeline, RunOutcome};
pub use query::QueryService;
