use log::{debug, warn};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StatsError};
use crate::point::Precision;

/// Default InfluxDB endpoint
pub const DEFAULT_ADDR: &str = "http://localhost:8086";
/// Default measurement prefix, suffixed with the hostname
pub const DEFAULT_MEASUREMENT: &str = "go.runtime";
/// Default 1.x database
pub const DEFAULT_DATABASE: &str = "stats";
/// Default 2.x bucket
pub const DEFAULT_BUCKET: &str = "stats";
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);
/// Capacity of the channel between the collector and the batch loop
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Which InfluxDB write API to talk to
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// InfluxDB 1.x: database, retention policy, basic auth
    #[default]
    V1,
    /// InfluxDB 2.x: organisation, bucket, token auth
    V2,
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Collector configuration as supplied by the embedder.
///
/// Every field is optional. Empty strings and zero intervals mean "use the
/// default"; call [`Config::resolve`] to get the effective values.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Write API flavour
    pub backend: Backend,
    /// InfluxDB `scheme://host:port`
    pub addr: String,
    /// 1.x database, created on startup when missing
    pub database: String,
    /// 1.x username
    pub username: String,
    /// 1.x password
    pub password: String,
    /// 1.x retention policy, server default when empty
    pub retention_policy: String,
    /// Timestamp precision of written points
    pub precision: Precision,
    /// 2.x API token
    pub auth_token: String,
    /// 2.x organisation
    pub org: String,
    /// 2.x bucket
    pub bucket: String,
    /// Measurement to write points to
    pub measurement: String,
    /// Interval between snapshots, in milliseconds
    pub collection_interval_ms: u64,
    /// Interval between batch flushes, in milliseconds
    pub batch_interval_ms: u64,
    /// Interval between health checks, in milliseconds
    pub ping_interval_ms: u64,
    /// Skip the `cpu.*` group
    pub disable_cpu: bool,
    /// Skip the `mem.*` group
    pub disable_mem: bool,
    /// Upper bound on points retained across failed flushes
    pub max_retained_points: Option<usize>,
    /// Point channel capacity
    pub channel_capacity: usize,
    /// Accept invalid TLS certificates from the store
    pub tls_skip_verify: bool,
    /// Logging level used by [`crate::util::logging::init`]
    pub log_level: LogLevel,
}

/// Fully populated configuration. Every duration is strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub backend: Backend,
    pub addr: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub retention_policy: String,
    pub precision: Precision,
    pub auth_token: String,
    pub org: String,
    pub bucket: String,
    pub measurement: String,
    pub collection_interval: Duration,
    pub batch_interval: Duration,
    pub ping_interval: Duration,
    pub enable_cpu: bool,
    pub enable_mem: bool,
    pub max_retained_points: Option<usize>,
    pub channel_capacity: usize,
    pub tls_skip_verify: bool,
    pub log_level: LogLevel,
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn millis_or(value: u64, default: Duration) -> Duration {
    if value == 0 {
        default
    } else {
        Duration::from_millis(value)
    }
}

/// Default measurement name: `go.runtime.<hostname>`
pub fn default_measurement() -> String {
    match hostname::get() {
        Ok(name) => format!("{}.{}", DEFAULT_MEASUREMENT, name.to_string_lossy()),
        Err(e) => {
            debug!("Hostname unavailable for measurement name: {}", e);
            format!("{}.unknown", DEFAULT_MEASUREMENT)
        }
    }
}

impl Config {
    /// Fill every empty field with its default, leaving `self` untouched
    pub fn resolve(&self) -> ResolvedConfig {
        let measurement = if self.measurement.is_empty() {
            default_measurement()
        } else {
            self.measurement.clone()
        };

        ResolvedConfig {
            backend: self.backend,
            addr: or_default(&self.addr, DEFAULT_ADDR),
            database: or_default(&self.database, DEFAULT_DATABASE),
            username: self.username.clone(),
            password: self.password.clone(),
            retention_policy: self.retention_policy.clone(),
            precision: self.precision,
            auth_token: self.auth_token.clone(),
            org: self.org.clone(),
            bucket: or_default(&self.bucket, DEFAULT_BUCKET),
            measurement,
            collection_interval: millis_or(self.collection_interval_ms, DEFAULT_COLLECTION_INTERVAL),
            batch_interval: millis_or(self.batch_interval_ms, DEFAULT_BATCH_INTERVAL),
            ping_interval: millis_or(self.ping_interval_ms, DEFAULT_PING_INTERVAL),
            enable_cpu: !self.disable_cpu,
            enable_mem: !self.disable_mem,
            max_retained_points: self.max_retained_points.filter(|max| *max > 0),
            channel_capacity: if self.channel_capacity == 0 {
                DEFAULT_CHANNEL_CAPACITY
            } else {
                self.channel_capacity
            },
            tls_skip_verify: self.tls_skip_verify,
            log_level: self.log_level.clone(),
        }
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path (TOML format)
    File(String),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
    /// Default configuration
    Defaults,
}

/// Load configuration from sources in order; later sources win
pub fn load_config<T>(sources: Vec<ConfigSource>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    let mut builder = ::config::Config::builder();

    for source in sources {
        match source {
            ConfigSource::File(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    warn!("Configuration file not found: {}", path.display());
                    continue;
                }

                debug!("Loading TOML configuration from file: {}", path.display());
                builder = builder.add_source(
                    ::config::File::from(path.as_path()).format(::config::FileFormat::Toml),
                );
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder = builder.add_source(
                    ::config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .try_parsing(true),
                );
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder = builder
                    .add_source(::config::File::from_str(&toml_str, ::config::FileFormat::Toml));
            }
            ConfigSource::Defaults => {
                // Defaults come from the Deserialize implementation
                debug!("Using default configuration values");
            }
        }
    }

    let config = builder
        .build()
        .map_err(|e| StatsError::Config(format!("Failed to build configuration: {}", e)))?;

    let result = config
        .try_deserialize()
        .map_err(|e| StatsError::Config(format!("Failed to deserialize configuration: {}", e)))?;

    debug!("Configuration loaded successfully: {:?}", result);

    Ok(result)
}

/// Configuration builder
pub struct ConfigBuilder<T: for<'de> Deserialize<'de>> {
    sources: Vec<ConfigSource>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: for<'de> Deserialize<'de> + Debug> ConfigBuilder<T> {
    /// Create a new config builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Add a TOML file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources
            .push(ConfigSource::File(path.as_ref().to_string_lossy().to_string()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Use default values
    pub fn use_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<T> {
        load_config::<T>(self.sources)
    }
}

impl<T: for<'de> Deserialize<'de> + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
