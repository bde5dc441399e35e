pub mod algo;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod render;
pub mod report;
pub mod schema;
pub mod scorer;
pub mod server;
pub mod severity;
pub mod visualization;

pub use config::{AppConfig, DetectorConfig, RenderConfig, ServerConfig};
pub use engine::{AnomalyDetector, ingest};
pub use error::{PipelineError, Result};
pub use render::ReportRenderer;
pub use report::{AnomalyRecord, AnomalyReport, CompanyInfo};
pub use schema::{ColumnType, ObservationBatch, Schema, Value};
pub use severity::Severity;
pub use visualization::Visualization;
