// Banking ETL - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod logging;
pub mod model;
pub mod parser;
pub mod rules;
pub mod scheduler;
pub mod schema;
pub mod transform;

// Re-export commonly used types
pub use config::{DetectionConfig, EtlConfig, GeneratorConfig};
pub use db::{load, open_database, setup_database, DashboardSnapshot, EtlRun};
pub use error::TransformError;
pub use model::{
    AnomalyReason, AnomalyRecord, CleanTransaction, RawBatch, RawTransaction,
    HIGH_VALUE_THRESHOLD, REQUIRED_COLUMNS,
};
pub use parser::read_raw;
pub use rules::{AnomalyEngine, AnomalyRule, HighValueRule, NonPositiveAmountRule, RapidRepeatRule};
pub use schema::{DropReason, DroppedRow, SchemaValidator};
pub use transform::{transform, TransformOutput, TransformReport, Transformer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
