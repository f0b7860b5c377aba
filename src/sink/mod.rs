//! Destinations for pushed points
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::Result;
use crate::point::Point;

#[cfg(feature = "influxdb")]
pub mod influx;
pub mod memory;

#[cfg(feature = "influxdb")]
pub use influx::{InfluxConnector, InfluxSink};
pub use memory::{MemoryConnector, MemorySink};

/// A live connection to a point store
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Write a batch. Either every point is accepted or the call fails.
    async fn write(&self, points: &[Point]) -> Result<()>;

    /// Check the store is reachable within `timeout`
    async fn ping(&self, timeout: Duration) -> Result<()>;

    /// Create the backing database or bucket if the store supports it
    async fn create_store(&self) -> Result<()> {
        Ok(())
    }

    /// Release the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get a name for this sink
    fn name(&self) -> &str;
}

/// Produces fresh sink connections, at startup and on reconnect
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection. Errors here are construction errors.
    async fn connect(&self) -> Result<Arc<dyn Sink>>;

    /// Get a name for this connector
    fn name(&self) -> &str;
}

/// The current connection, shared by the batch and health loops.
///
/// The handle is only ever replaced as a whole, never mutated in place.
pub struct SinkHandle {
    current: watch::Sender<Arc<dyn Sink>>,
}

impl SinkHandle {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        let (current, _) = watch::channel(sink);
        Self { current }
    }

    /// The connection in use right now
    pub fn current(&self) -> Arc<dyn Sink> {
        Arc::clone(&self.current.borrow())
    }

    /// Swap in a new connection, returning the one it replaced
    pub fn replace(&self, sink: Arc<dyn Sink>) -> Arc<dyn Sink> {
        self.current.send_replace(sink)
    }

    /// Watch for replacements
    pub fn subscribe(&self) -> watch::Receiver<Arc<dyn Sink>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_returns_previous_handle() {
        let first: Arc<dyn Sink> = Arc::new(MemorySink::new("first"));
        let second: Arc<dyn Sink> = Arc::new(MemorySink::new("second"));
        let handle = SinkHandle::new(first);
        let mut updates = handle.subscribe();

        assert_eq!(handle.current().name(), "first");
        let old = handle.replace(second);
        assert_eq!(old.name(), "first");
        assert_eq!(handle.current().name(), "second");
        assert!(updates.has_changed().unwrap());
    }
}
