// src/config/mod.rs
pub mod classifier;
pub mod collector;

pub use classifier::ClassifierConfig;
pub use collector::{
    load_default, load_from, CollectorConfig, IndicatorConfig, LimitsConfig, PathsConfig,
    RetryConfig, RunMode, ScoringPolicy,
};
