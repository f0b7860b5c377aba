//! InfluxDB 1.x and 2.x over HTTP
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Url};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{Connector, Sink};
use crate::config::{Backend, ResolvedConfig};
use crate::error::{Result, StatsError};
use crate::point::{encode_batch, Point, Precision};

/// Timeout of the reachability check made while connecting
pub const CONNECT_PING_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout of every write and query request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which write API a sink talks to, with its credentials
#[derive(Debug, Clone)]
pub enum WriteApi {
    V1 {
        database: String,
        retention_policy: String,
        username: String,
        password: String,
    },
    V2 {
        org: String,
        bucket: String,
        token: String,
    },
}

/// Everything needed to open a connection
#[derive(Debug, Clone)]
pub struct InfluxSettings {
    /// Base URL without trailing slash
    pub addr: String,
    pub api: WriteApi,
    pub precision: Precision,
    pub tls_skip_verify: bool,
}

impl InfluxSettings {
    /// Settings for the configured backend. Fails on an unusable endpoint.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let url = Url::parse(&config.addr)
            .map_err(|e| StatsError::Config(format!("Invalid InfluxDB address {}: {}", config.addr, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StatsError::Config(format!(
                "Unsupported scheme {} in InfluxDB address {}",
                url.scheme(),
                config.addr
            ))
            .into());
        }

        let api = match config.backend {
            Backend::V1 => WriteApi::V1 {
                database: config.database.clone(),
                retention_policy: config.retention_policy.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
            Backend::V2 => WriteApi::V2 {
                org: config.org.clone(),
                bucket: config.bucket.clone(),
                token: config.auth_token.clone(),
            },
        };

        Ok(Self {
            addr: config.addr.trim_end_matches('/').to_string(),
            api,
            precision: config.precision,
            tls_skip_verify: config.tls_skip_verify,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.addr, path)
    }
}

/// One HTTP connection to an InfluxDB server
pub struct InfluxSink {
    client: Client,
    settings: InfluxSettings,
    closed: AtomicBool,
    name: String,
}

impl InfluxSink {
    /// Build the HTTP client. Does not touch the network.
    pub fn new(settings: InfluxSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(settings.tls_skip_verify)
            .build()
            .map_err(|e| StatsError::Connection(format!("Failed to create InfluxDB client: {}", e)))?;

        let name = match &settings.api {
            WriteApi::V1 { database, .. } => format!("influxdb-v1:{}", database),
            WriteApi::V2 { bucket, .. } => format!("influxdb-v2:{}", bucket),
        };

        Ok(Self {
            client,
            settings,
            closed: AtomicBool::new(false),
            name,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.settings.api {
            WriteApi::V1 { username, password, .. } if !username.is_empty() => {
                request.basic_auth(username, Some(password))
            }
            WriteApi::V2 { token, .. } if !token.is_empty() => {
                request.header("Authorization", format!("Token {}", token))
            }
            _ => request,
        }
    }

    fn write_request(&self, body: String) -> RequestBuilder {
        let precision = self.settings.precision;
        let request = match &self.settings.api {
            WriteApi::V1 {
                database,
                retention_policy,
                ..
            } => {
                let mut query = vec![("db", database.as_str()), ("precision", precision.v1_param())];
                if !retention_policy.is_empty() {
                    query.push(("rp", retention_policy.as_str()));
                }
                self.client.post(self.settings.endpoint("write")).query(&query)
            }
            WriteApi::V2 { org, bucket, .. } => self
                .client
                .post(self.settings.endpoint("api/v2/write"))
                .query(&[
                    ("org", org.as_str()),
                    ("bucket", bucket.as_str()),
                    ("precision", precision.v2_param()),
                ]),
        };

        self.authorize(request)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StatsError::Sink(format!("{} failed: {} - {}", context, status, body.trim())).into())
    }
}

#[async_trait]
impl Sink for InfluxSink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StatsError::Sink(format!("{} is closed", self.name)).into());
        }

        let body = encode_batch(points, self.settings.precision);
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .write_request(body)
            .send()
            .await
            .map_err(|e| StatsError::Sink(format!("Could not write points to InfluxDB: {}", e)))?;
        Self::check(response, "InfluxDB write").await?;

        debug!("Wrote {} points to {}", points.len(), self.name);
        Ok(())
    }

    async fn ping(&self, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .get(self.settings.endpoint("ping"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StatsError::Timeout(format!("Ping to {} timed out after {:?}", self.settings.addr, timeout))
                } else {
                    StatsError::Connection(format!("Ping to {} failed: {}", self.settings.addr, e))
                }
            })?;
        Self::check(response, "InfluxDB ping").await?;
        Ok(())
    }

    async fn create_store(&self) -> Result<()> {
        let WriteApi::V1 { database, .. } = &self.settings.api else {
            debug!("{} manages buckets server-side, nothing to create", self.name);
            return Ok(());
        };

        let command = format!("CREATE DATABASE \"{}\"", database.replace('"', "\\\""));
        let request = self
            .client
            .post(self.settings.endpoint("query"))
            .query(&[("q", command.as_str())]);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StatsError::Sink(format!("Failed to query InfluxDB: {}", e)))?;
        let response = Self::check(response, "CREATE DATABASE").await?;

        // 1.x reports statement errors inside a 200 response
        let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap_or_default())
            .unwrap_or(serde_json::Value::Null);
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(StatsError::Sink(error.to_string()).into());
        }
        if let Some(results) = body.get("results").and_then(|r| r.as_array()) {
            if let Some(error) = results
                .iter()
                .find_map(|r| r.get("error").and_then(|e| e.as_str()))
            {
                return Err(StatsError::Sink(error.to_string()).into());
            }
        }

        info!("Database {} is ready", database);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opens [`InfluxSink`]s for one configuration
pub struct InfluxConnector {
    settings: InfluxSettings,
    name: String,
}

impl InfluxConnector {
    pub fn new(settings: InfluxSettings) -> Self {
        let name = format!("influxdb@{}", settings.addr);
        Self { settings, name }
    }

    /// Connector for a resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        Ok(Self::new(InfluxSettings::from_config(config)?))
    }
}

#[async_trait]
impl Connector for InfluxConnector {
    async fn connect(&self) -> Result<Arc<dyn Sink>> {
        let sink = InfluxSink::new(self.settings.clone())?;

        // An unreachable server is not fatal: the health loop keeps checking
        match sink.ping(CONNECT_PING_TIMEOUT).await {
            Ok(()) => info!("Connected to InfluxDB at {}", self.settings.addr),
            Err(e) => warn!("Failed to ping InfluxDB at {}: {}", self.settings.addr, e),
        }

        let sink: Arc<dyn Sink> = Arc::new(sink);
        Ok(sink)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn rejects_unusable_addresses() {
        let bad = Config {
            addr: "not a url".to_string(),
            ..Default::default()
        };
        assert!(InfluxSettings::from_config(&bad.resolve()).is_err());

        let wrong_scheme = Config {
            addr: "ftp://influx:8086".to_string(),
            ..Default::default()
        };
        assert!(InfluxSettings::from_config(&wrong_scheme.resolve()).is_err());
    }

    #[test]
    fn settings_follow_backend() {
        let v2 = Config {
            backend: Backend::V2,
            addr: "http://influx:8086/".to_string(),
            org: "acme".to_string(),
            auth_token: "secret".to_string(),
            ..Default::default()
        };
        let settings = InfluxSettings::from_config(&v2.resolve()).unwrap();
        assert_eq!(settings.addr, "http://influx:8086");
        assert_eq!(settings.endpoint("ping"), "http://influx:8086/ping");
        match settings.api {
            WriteApi::V2 { org, bucket, token } => {
                assert_eq!(org, "acme");
                assert_eq!(bucket, "stats");
                assert_eq!(token, "secret");
            }
            other => panic!("unexpected api {:?}", other),
        }
    }

    #[test]
    fn v1_write_request_carries_database_and_auth() {
        let config = Config {
            database: "metrics".to_string(),
            retention_policy: "week".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            ..Default::default()
        };
        let sink = InfluxSink::new(InfluxSettings::from_config(&config.resolve()).unwrap()).unwrap();
        let request = sink.write_request("m a=1i 1\n".to_string()).build().unwrap();

        assert_eq!(request.method(), &reqwest::Method::POST);
        assert_eq!(request.url().path(), "/write");
        let query = request.url().query().unwrap();
        assert!(query.contains("db=metrics"));
        assert!(query.contains("rp=week"));
        assert!(query.contains("precision=n"));
        assert!(request.headers().contains_key("authorization"));
    }

    #[test]
    fn v2_write_request_uses_token() {
        let config = Config {
            backend: Backend::V2,
            org: "acme".to_string(),
            bucket: "runtime".to_string(),
            auth_token: "secret".to_string(),
            ..Default::default()
        };
        let sink = InfluxSink::new(InfluxSettings::from_config(&config.resolve()).unwrap()).unwrap();
        let request = sink.write_request(String::new()).build().unwrap();

        assert_eq!(request.url().path(), "/api/v2/write");
        let query = request.url().query().unwrap();
        assert!(query.contains("org=acme"));
        assert!(query.contains("bucket=runtime"));
        assert!(query.contains("precision=ns"));
        assert_eq!(request.headers()["authorization"], "Token secret");
    }

    #[tokio::test]
    async fn closed_sink_refuses_writes() {
        let sink = InfluxSink::new(InfluxSettings::from_config(&Config::default().resolve()).unwrap()).unwrap();
        sink.close().await.unwrap();
        let points = vec![Point::new("m", chrono::Utc::now()).field("a", 1i64)];
        assert!(sink.write(&points).await.is_err());
    }
}
