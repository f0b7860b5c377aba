//! Periodic runtime statistics for tokio applications, pushed to InfluxDB
//! in batches or pulled on demand.

pub mod agent;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod connection;
pub mod error;
pub mod point;
#[cfg(feature = "publish")]
pub mod publish;
pub mod sender;
pub mod sink;
pub mod stats;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    #[cfg(feature = "influxdb")]
    pub use crate::agent::run_collector;
    pub use crate::agent::{run_with_connector, RunningCollector};
    pub use crate::collector::{Collector, CollectorConfig, CollectorConfigBuilder, StatsCallback};
    pub use crate::config::{Backend, Config, ConfigBuilder, ResolvedConfig};
    pub use crate::connection::ConnectionState;
    pub use crate::error::{Result, StatsError};
    pub use crate::point::{Point, Precision};
    #[cfg(feature = "publish")]
    pub use crate::publish::{publish_runtime_metrics, Registry};
    pub use crate::sink::{Connector, Sink};
    pub use crate::stats::{Fields, TrackingAllocator};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
