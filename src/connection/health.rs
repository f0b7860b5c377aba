use log::{debug, error, info, trace, warn};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;

use crate::sink::{Connector, SinkHandle};

/// Timeout of each periodic ping
pub const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Whether the last ping reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Degraded,
}

/// Connection state shared with the owner of the pipeline
pub struct HealthStatus {
    /// Is the connection healthy
    healthy: AtomicBool,

    /// Name of the connection
    name: String,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            healthy: AtomicBool::new(true), // Assume healthy initially
            name: name.into(),
        }
    }

    /// Check if the connection is healthy
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Set the health status
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_healthy() {
            ConnectionState::Connected
        } else {
            ConnectionState::Degraded
        }
    }

    /// Get the name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Health transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// A ping failed while connected
    Degraded { name: String, reason: String },

    /// A fresh connection replaced the degraded one
    Reconnected { name: String },
}

/// Pings the current sink and swaps in a new connection after recovery.
///
/// A failed ping marks the connection degraded. The first successful ping
/// after that opens a new connection through the connector, installs it
/// in the shared handle and closes the old one.
pub struct HealthMonitor {
    handle: Arc<SinkHandle>,
    connector: Arc<dyn Connector>,
    status: Arc<HealthStatus>,
    interval: Duration,
    ping_timeout: Duration,
    events: Option<mpsc::Sender<HealthEvent>>,
}

impl HealthMonitor {
    pub fn new(
        handle: Arc<SinkHandle>,
        connector: Arc<dyn Connector>,
        status: Arc<HealthStatus>,
        interval: Duration,
    ) -> Self {
        Self {
            handle,
            connector,
            status,
            interval,
            ping_timeout: PING_TIMEOUT,
            events: None,
        }
    }

    /// Report transitions on `events`. A full channel drops the event.
    pub fn with_events(mut self, events: mpsc::Sender<HealthEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    /// Run until `shutdown` is cancelled. The first ping happens one
    /// interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let name = self.status.name().to_string();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting health checks for {} (interval: {:?})",
            name, self.interval
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Health checks for {} stopped", name);
                    break;
                }
                _ = ticker.tick() => self.check().await,
            }
        }
    }

    async fn check(&self) {
        let sink = self.handle.current();
        let result = match timeout(self.ping_timeout, sink.ping(self.ping_timeout)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("no reply within {:?}", self.ping_timeout)),
        };

        match result {
            Err(e) => {
                let reason = format!("Ping error: {}", e);
                if self.status.is_healthy() {
                    error!("Connection {} is now degraded: {}", self.status.name(), reason);
                    self.status.set_healthy(false);
                    self.emit(HealthEvent::Degraded {
                        name: self.status.name().to_string(),
                        reason,
                    });
                } else {
                    warn!("Connection {} is still degraded: {}", self.status.name(), reason);
                }
            }
            Ok(()) if self.status.is_healthy() => {
                trace!("Health check passed for {}", sink.name());
            }
            Ok(()) => self.reconnect().await,
        }
    }

    async fn reconnect(&self) {
        info!("{} answers again, reconnecting", self.status.name());

        let fresh = match self.connector.connect().await {
            Ok(fresh) => fresh,
            Err(e) => {
                // Stay degraded, the next successful ping retries
                warn!("Reconnect through {} failed: {}", self.connector.name(), e);
                return;
            }
        };

        let old = self.handle.replace(fresh);
        if let Err(e) = old.close().await {
            warn!("Failed to close replaced connection {}: {}", old.name(), e);
        }

        self.status.set_healthy(true);
        info!(
            "Connection {} has recovered, now using {}",
            self.status.name(),
            self.handle.current().name()
        );
        self.emit(HealthEvent::Reconnected {
            name: self.status.name().to_string(),
        });
    }

    fn emit(&self, event: HealthEvent) {
        if let Some(events) = &self.events {
            if events.try_send(event).is_err() {
                debug!("Dropped health event for {}", self.status.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemoryConnector, Sink};

    async fn setup(interval: Duration) -> (Arc<MemoryConnector>, Arc<SinkHandle>, Arc<HealthStatus>, HealthMonitor) {
        let connector = Arc::new(MemoryConnector::new("mem"));
        let handle = Arc::new(SinkHandle::new(connector.connect().await.unwrap()));
        let status = Arc::new(HealthStatus::new("mem"));
        let dyn_connector: Arc<dyn Connector> = connector.clone();
        let monitor = HealthMonitor::new(handle.clone(), dyn_connector, status.clone(), interval);
        (connector, handle, status, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_replaces_handle_once() {
        let (connector, handle, status, monitor) = setup(Duration::from_secs(1)).await;
        let (tx, mut events) = mpsc::channel(10);
        let monitor = monitor.with_events(tx);

        let first = connector.created().unwrap()[0].clone();
        first.fail_pings(2);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(monitor.run(shutdown.clone()));

        // Pings at 1s and 2s fail, 3s succeeds and reconnects, 4s and 5s are quiet
        tokio::time::sleep(Duration::from_millis(5500)).await;
        shutdown.cancel();
        task.await.unwrap();

        let created = connector.created().unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(first.close_count(), 1);
        assert_eq!(created[1].close_count(), 0);
        assert_eq!(handle.current().name(), "mem-1");
        assert_eq!(status.state(), ConnectionState::Connected);

        assert!(matches!(events.recv().await, Some(HealthEvent::Degraded { .. })));
        assert_eq!(
            events.recv().await,
            Some(HealthEvent::Reconnected { name: "mem".to_string() })
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_connection_is_left_alone() {
        let (connector, handle, status, monitor) = setup(Duration::from_secs(1)).await;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(monitor.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(connector.created().unwrap().len(), 1);
        assert_eq!(connector.created().unwrap()[0].ping_attempts(), 3);
        assert_eq!(handle.current().name(), "mem-0");
        assert!(status.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ping_degrades_until_recovery() {
        let (connector, _handle, status, monitor) = setup(Duration::from_secs(1)).await;
        connector.created().unwrap()[0].fail_pings(usize::MAX);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(monitor.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(status.state(), ConnectionState::Degraded);
        assert_eq!(connector.created().unwrap().len(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }
}
