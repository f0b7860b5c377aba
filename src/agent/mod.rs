//! Starts and stops the push pipeline
use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collector::{Collector, CollectorConfigBuilder};
use crate::config::ResolvedConfig;
use crate::connection::{ConnectionState, HealthMonitor, HealthStatus};
use crate::error::Result;
use crate::sender::{BatchSender, PointSender};
use crate::sink::{Connector, Sink, SinkHandle};

#[cfg(feature = "influxdb")]
use crate::config::Config;
#[cfg(feature = "influxdb")]
use crate::sink::InfluxConnector;

/// Handle on a running pipeline.
///
/// Dropping it cancels every task without waiting for the final flush;
/// call [`RunningCollector::shutdown`] to wait for it.
pub struct RunningCollector {
    shutdown: CancellationToken,
    status: Arc<HealthStatus>,
    handle: Arc<SinkHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningCollector {
    /// Whether the last health check reached the store
    pub fn is_connected(&self) -> bool {
        self.status.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// The sink writes currently go to
    pub fn sink(&self) -> Arc<dyn Sink> {
        self.handle.current()
    }

    /// Token cancelled when the pipeline stops
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every task, wait for the final flush and close the sink
    pub async fn shutdown(mut self) {
        info!("Stopping runtime stats collection");
        self.shutdown.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Pipeline task ended abnormally: {}", e);
            }
        }

        let sink = self.handle.current();
        if let Err(e) = sink.close().await {
            warn!("Failed to close {}: {}", sink.name(), e);
        }
    }
}

impl Drop for RunningCollector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Start collecting into the InfluxDB instance described by `config`.
///
/// Fails only when the connection cannot be constructed; an unreachable
/// server is left to the health loop.
#[cfg(feature = "influxdb")]
pub async fn run_collector(config: &Config) -> Result<RunningCollector> {
    let resolved = config.resolve();
    let connector = InfluxConnector::from_config(&resolved)?;
    run_with_connector(resolved, Arc::new(connector)).await
}

/// Start the pipeline on sinks produced by `connector`.
///
/// Returns as soon as the collector, batch and health tasks are spawned.
/// Must be called inside a tokio runtime.
pub async fn run_with_connector(
    config: ResolvedConfig,
    connector: Arc<dyn Connector>,
) -> Result<RunningCollector> {
    let sink = connector
        .connect()
        .await
        .with_context(|| format!("Failed to connect through {}", connector.name()))?;

    if let Err(e) = sink.create_store().await {
        warn!("Could not create store on {}: {}", sink.name(), e);
    }

    let shutdown = CancellationToken::new();
    let handle = Arc::new(SinkHandle::new(sink));
    let status = Arc::new(HealthStatus::new(connector.name()));
    let mut tasks = Vec::with_capacity(3);

    let monitor = HealthMonitor::new(
        Arc::clone(&handle),
        Arc::clone(&connector),
        Arc::clone(&status),
        config.ping_interval,
    );
    tasks.push(tokio::spawn(monitor.run(shutdown.child_token())));

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let sender = BatchSender::new(
        Arc::clone(&handle),
        config.batch_interval,
        config.max_retained_points,
    );
    tasks.push(tokio::spawn(sender.run(rx, shutdown.child_token())));

    let collector_config = CollectorConfigBuilder::new(config.measurement.clone())
        .interval(config.collection_interval)
        .enable_cpu(config.enable_cpu)
        .enable_mem(config.enable_mem)
        .build();
    let points = PointSender::new(config.measurement.clone(), tx);
    let collector = Collector::with_config(collector_config, Some(points.into_callback()));
    let token = shutdown.child_token();
    tasks.push(tokio::spawn(async move { collector.run(token).await }));

    info!(
        "Collecting runtime stats into {} as {} every {:?}",
        connector.name(),
        config.measurement,
        config.collection_interval
    );

    Ok(RunningCollector {
        shutdown,
        status,
        handle,
        tasks,
    })
}
