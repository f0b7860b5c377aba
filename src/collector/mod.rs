mod config;
mod periodic;

// Re-export public items
pub use config::{CollectorConfig, CollectorConfigBuilder, DEFAULT_INTERVAL};
pub use periodic::{Collector, StatsCallback};
