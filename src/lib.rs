// src/lib.rs
// Library surface for the collector binary and integration tests.

pub mod article;
pub mod classify;
pub mod config;
pub mod indicator;
pub mod ingest;
pub mod pipeline;
pub mod scoring;
pub mod store;
pub mod telemetry;

pub use article::{Article, Classification, ClassificationStatus};
pub use config::CollectorConfig;
pub use indicator::Indicator;
pub use pipeline::{persist_outputs, run_once, RunOutcome, RunStats};
pub use scoring::RiskBucket;
