//! Periodic snapshot loop
use log::{debug, info};
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::CollectorConfig;
use crate::stats::{self, Fields};

/// Receives every snapshot taken by [`Collector::run`]
pub type StatsCallback = Arc<dyn Fn(Fields) + Send + Sync>;

/// Periodically snapshots the runtime counters and hands each snapshot to a
/// callback.
///
/// The collector holds no mutable state, so restarting means building a new
/// one.
pub struct Collector {
    config: CollectorConfig,
    callback: StatsCallback,
}

impl Collector {
    /// Create a collector with the default configuration: 10s interval, CPU
    /// and memory enabled. A missing callback becomes a no-op.
    pub fn new(callback: Option<StatsCallback>) -> Self {
        Self::with_config(CollectorConfig::default(), callback)
    }

    /// Create a collector from a closure
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(Fields) + Send + Sync + 'static,
    {
        Self::new(Some(Arc::new(callback)))
    }

    /// Create a collector with an explicit configuration
    pub fn with_config(config: CollectorConfig, callback: Option<StatsCallback>) -> Self {
        Self {
            config,
            callback: callback.unwrap_or_else(|| Arc::new(|_| {})),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Take a snapshot now, independent of the timer loop
    pub fn collect_stats(&self) -> Fields {
        stats::capture(self.config.enable_cpu, self.config.enable_mem)
    }

    /// Snapshot every interval until `shutdown` is cancelled.
    ///
    /// The first snapshot is taken one interval after the call. The callback
    /// runs inline, so a slow callback delays the next tick instead of
    /// overlapping it, and cancellation never interrupts a callback.
    pub async fn run(&self, shutdown: CancellationToken) {
        let period = self.config.interval.max(time::Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting collector {} (interval: {:?}, cpu: {}, mem: {})",
            self.config.name, period, self.config.enable_cpu, self.config.enable_mem
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Collector {} stopped", self.config.name);
                    return;
                }
                _ = ticker.tick() => {
                    (self.callback)(self.collect_stats());
                }
            }
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorConfigBuilder;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let collector = Collector::new(None);
        assert_eq!(collector.config().interval, Duration::from_secs(10));
        assert!(collector.config().enable_cpu);
        assert!(collector.config().enable_mem);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_callback_is_a_no_op() {
        let collector = Arc::new(Collector::with_config(
            CollectorConfigBuilder::new("noop")
                .interval(Duration::from_secs(1))
                .build(),
            None,
        ));
        let token = CancellationToken::new();
        let task = tokio::spawn({
            let collector = Arc::clone(&collector);
            let token = token.clone();
            async move { collector.run(token).await }
        });

        time::sleep(Duration::from_millis(2500)).await;
        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn invokes_callback_once_per_tick_until_cancelled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let collector = Arc::new(Collector::with_config(
            CollectorConfigBuilder::new("ticks")
                .interval(Duration::from_secs(1))
                .build(),
            Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        ));

        let token = CancellationToken::new();
        let task = tokio::spawn({
            let collector = Arc::clone(&collector);
            let token = token.clone();
            async move { collector.run(token).await }
        });

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        token.cancel();
        task.await.unwrap();

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callback_delays_rather_than_overlaps() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (flight, seen) = (Arc::clone(&in_flight), Arc::clone(&max_seen));

        let collector = Arc::new(Collector::with_config(
            CollectorConfigBuilder::new("slow")
                .interval(Duration::from_millis(10))
                .build(),
            Some(Arc::new(move |_| {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                flight.fetch_sub(1, Ordering::SeqCst);
            })),
        ));

        let token = CancellationToken::new();
        let task = tokio::spawn({
            let collector = Arc::clone(&collector);
            let token = token.clone();
            async move { collector.run(token).await }
        });

        time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        task.await.unwrap();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn collectors_do_not_share_flags() {
        let cpu_only = Collector::with_config(
            CollectorConfigBuilder::new("cpu").enable_mem(false).build(),
            None,
        );
        let mem_only = Collector::with_config(
            CollectorConfigBuilder::new("mem").enable_cpu(false).build(),
            None,
        );

        let from_cpu = cpu_only.collect_stats();
        let from_mem = mem_only.collect_stats();
        let again_cpu = cpu_only.collect_stats();

        assert!(from_cpu.num_cpu >= 1);
        assert_eq!(from_cpu.sys, 0);
        assert_eq!(from_mem.num_cpu, 0);
        assert!(from_mem.sys > 0);
        assert_eq!(again_cpu.sys, 0);
        assert!(again_cpu.num_cpu >= 1);
    }

    #[tokio::test]
    async fn collect_stats_runs_alongside_the_loop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let collector = Arc::new(Collector::with_config(
            CollectorConfigBuilder::new("concurrent")
                .interval(Duration::from_millis(5))
                .build(),
            Some(Arc::new(move |fields: Fields| {
                sink.lock().unwrap().push(fields.num_cpu);
            })),
        ));

        let token = CancellationToken::new();
        let task = tokio::spawn({
            let collector = Arc::clone(&collector);
            let token = token.clone();
            async move { collector.run(token).await }
        });

        for _ in 0..5 {
            assert!(collector.collect_stats().num_cpu >= 1);
            time::sleep(Duration::from_millis(3)).await;
        }

        token.cancel();
        task.await.unwrap();
        assert!(seen.lock().unwrap().iter().all(|n| *n >= 1));
    }
}
