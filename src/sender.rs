//! Push pipeline between the collector and the current sink
use chrono::Utc;
use log::{debug, error, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::buffer::PointBatch;
use crate::collector::StatsCallback;
use crate::point::Point;
use crate::sink::SinkHandle;
use crate::stats::Fields;

/// Turns snapshots into points and queues them for the batch loop.
///
/// Enqueueing never blocks the collector: when the queue is full the point
/// is dropped with a warning.
pub struct PointSender {
    measurement: String,
    points: mpsc::Sender<Point>,
}

impl PointSender {
    pub fn new(measurement: impl Into<String>, points: mpsc::Sender<Point>) -> Self {
        Self {
            measurement: measurement.into(),
            points,
        }
    }

    /// Queue one snapshot, timestamped now
    pub fn on_new_point(&self, fields: Fields) {
        let point = Point::from_fields(&self.measurement, &fields, Utc::now());
        match self.points.try_send(point) {
            Ok(()) => trace!("Queued point for {}", self.measurement),
            Err(TrySendError::Full(_)) => {
                warn!("Point queue for {} is full, dropping point", self.measurement)
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Batch loop for {} has stopped, dropping point", self.measurement)
            }
        }
    }

    /// Collector callback feeding this sender
    pub fn into_callback(self) -> StatsCallback {
        Arc::new(move |fields| self.on_new_point(fields))
    }
}

/// Owns the pending batch and flushes it to whatever sink is current.
///
/// A failed flush keeps the batch, so the next flush resends every point
/// accumulated since the last success.
pub struct BatchSender {
    handle: Arc<SinkHandle>,
    interval: Duration,
    batch: PointBatch,
}

impl BatchSender {
    pub fn new(handle: Arc<SinkHandle>, interval: Duration, max_points: Option<usize>) -> Self {
        Self {
            handle,
            interval,
            batch: PointBatch::with_limit(max_points),
        }
    }

    /// Receive points and flush every interval until `shutdown` is
    /// cancelled or every sender is gone. Pending points get one last
    /// flush on the way out.
    pub async fn run(mut self, mut points: mpsc::Receiver<Point>, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Batch loop started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    while let Ok(point) = points.try_recv() {
                        self.batch.push(point);
                    }
                    break;
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
                point = points.recv() => match point {
                    Some(point) => self.batch.push(point),
                    None => break,
                },
            }
        }

        self.flush().await;
        debug!("Batch loop stopped with {} unsent points", self.batch.len());
    }

    /// Write the pending batch. Returns whether the batch is now empty.
    pub async fn flush(&mut self) -> bool {
        if self.batch.is_empty() {
            return true;
        }

        let sink = self.handle.current();
        let count = self.batch.len();
        match sink.write(self.batch.as_slice()).await {
            Ok(()) => {
                self.batch.take();
                debug!("Flushed {} points to {}", count, sink.name());
                true
            }
            Err(e) => {
                error!("Could not write {} points to {}: {}", count, sink.name(), e);
                false
            }
        }
    }

    /// Points waiting for the next flush
    pub fn pending(&self) -> usize {
        self.batch.len()
    }
}
