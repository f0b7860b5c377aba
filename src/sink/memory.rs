use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::{Connector, Sink};
use crate::error::{Result, StatsError};
use crate::point::Point;

/// In-memory sink, for tests and for embedders that read points back
pub struct MemorySink {
    /// Accepted batches, in write order
    batches: RwLock<Vec<Vec<Point>>>,

    /// Writes still to fail before accepting again
    failing_writes: AtomicUsize,

    /// Pings still to fail before succeeding again
    failing_pings: AtomicUsize,

    write_attempts: AtomicUsize,
    ping_attempts: AtomicUsize,
    close_count: AtomicUsize,
    closed: AtomicBool,

    /// Sink name
    name: String,
}

impl MemorySink {
    /// Create a new memory sink
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            batches: RwLock::new(Vec::new()),
            failing_writes: AtomicUsize::new(0),
            failing_pings: AtomicUsize::new(0),
            write_attempts: AtomicUsize::new(0),
            ping_attempts: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            name: name.into(),
        }
    }

    /// Fail the next `count` writes
    pub fn fail_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` pings
    pub fn fail_pings(&self, count: usize) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    /// Every accepted batch
    pub fn batches(&self) -> Result<Vec<Vec<Point>>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| StatsError::Sink("Lock poisoned".to_string()))?;
        Ok(batches.clone())
    }

    /// Every accepted point, flattened
    pub fn points(&self) -> Result<Vec<Point>> {
        Ok(self.batches()?.into_iter().flatten().collect())
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn ping_attempts(&self) -> usize {
        self.ping_attempts.load(Ordering::SeqCst)
    }

    /// How many times `close` was called
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Err(StatsError::Sink(format!("{} is closed", self.name)).into());
        }
        if Self::take_failure(&self.failing_writes) {
            return Err(StatsError::Sink(format!("{} rejected the write", self.name)).into());
        }

        let mut batches = self
            .batches
            .write()
            .map_err(|_| StatsError::Sink("Lock poisoned".to_string()))?;
        batches.push(points.to_vec());
        Ok(())
    }

    async fn ping(&self, _timeout: Duration) -> Result<()> {
        self.ping_attempts.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.failing_pings) {
            return Err(StatsError::Connection(format!("{} is unreachable", self.name)).into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Hands out [`MemorySink`]s and remembers every one it created
pub struct MemoryConnector {
    created: RwLock<Vec<Arc<MemorySink>>>,
    name: String,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            created: RwLock::new(Vec::new()),
            name: name.into(),
        }
    }

    /// Every sink handed out so far, oldest first
    pub fn created(&self) -> Result<Vec<Arc<MemorySink>>> {
        let created = self
            .created
            .read()
            .map_err(|_| StatsError::Sink("Lock poisoned".to_string()))?;
        Ok(created.clone())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn Sink>> {
        let mut created = self
            .created
            .write()
            .map_err(|_| StatsError::Sink("Lock poisoned".to_string()))?;
        let sink = Arc::new(MemorySink::new(format!("{}-{}", self.name, created.len())));
        created.push(Arc::clone(&sink));
        let sink: Arc<dyn Sink> = sink;
        Ok(sink)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
