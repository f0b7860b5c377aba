use std::time::Duration;

/// Default collection interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for a collector
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Name used in log lines
    pub name: String,
    /// Interval between snapshots
    pub interval: Duration,
    /// Collect the `cpu.*` group
    pub enable_cpu: bool,
    /// Collect the `mem.*` group
    pub enable_mem: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            name: "runtime".to_string(),
            interval: DEFAULT_INTERVAL,
            enable_cpu: true,
            enable_mem: true,
        }
    }
}

/// Builder for collector configuration
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    /// Create a new collector config builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: CollectorConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Set the collection interval. A zero interval keeps the current one.
    pub fn interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.config.interval = interval;
        }
        self
    }

    pub fn enable_cpu(mut self, enable: bool) -> Self {
        self.config.enable_cpu = enable;
        self
    }

    pub fn enable_mem(mut self, enable: bool) -> Self {
        self.config.enable_mem = enable;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CollectorConfig {
        self.config
    }
}
