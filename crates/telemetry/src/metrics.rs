//! Interval metrics aggregation.
//!
//! Producer and consumer push counts and latency samples into a shared
//! [`MetricsAggregator`]. Once per flush interval the aggregator reads and
//! resets the window, derives rates and percentiles, and hands the
//! resulting [`MetricsSnapshot`] to its sink.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use workload_core::limits::{LATENCY_WINDOW_CAPACITY, MAX_LATENCY_MS};

use crate::sink::{Dimensions, MetricsSink};

/// Default flush interval (10 seconds).
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Write-only capability held by producers and consumers.
pub trait MetricsRecorder: Send + Sync {
    fn record_sent(&self, n: u64);
    fn record_received(&self, n: u64);
    /// Records an end-to-end latency sample in milliseconds.
    fn record_latency(&self, ms: i64);
}

/// Recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn record_sent(&self, _n: u64) {}
    fn record_received(&self, _n: u64) {}
    fn record_latency(&self, _ms: i64) {}
}

/// Returns true if a latency sample is inside `[0, MAX_LATENCY_MS)`.
pub fn is_recordable_latency(ms: i64) -> bool {
    (0..MAX_LATENCY_MS).contains(&ms)
}

/// Bounded FIFO of latency samples; the oldest sample is evicted first.
#[derive(Debug)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(LATENCY_WINDOW_CAPACITY)
    }
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, ms: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples in insertion order, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    /// Take all samples and reset the window.
    pub fn take(&mut self) -> Vec<u64> {
        let samples = std::mem::take(&mut self.samples);
        self.samples.reserve(self.capacity);
        samples.into()
    }
}

/// Latency statistics for one flush window, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub avg: f64,
    pub min: u64,
    pub max: u64,
    pub p95: u64,
    pub p99: u64,
}

impl LatencySummary {
    /// Summarizes a set of samples. Returns `None` when empty.
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let n = sorted.len();

        Some(Self {
            samples: n,
            avg: sum as f64 / n as f64,
            min: sorted[0],
            max: sorted[n - 1],
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        })
    }
}

/// `sorted[floor(n * p)]`, clamped to the last element.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let index = (sorted.len() as f64 * p).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// A flushed interval of statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub interval_ms: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub sent_per_second: f64,
    pub received_per_second: f64,
    pub total_sent: u64,
    pub total_received: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencySummary>,
}

impl MetricsSnapshot {
    fn compute(
        interval_ms: u64,
        messages_sent: u64,
        messages_received: u64,
        total_sent: u64,
        total_received: u64,
        samples: &[u64],
    ) -> Self {
        let interval_secs = interval_ms as f64 / 1000.0;
        let rate = |count: u64| {
            if interval_secs > 0.0 {
                count as f64 / interval_secs
            } else {
                0.0
            }
        };

        Self {
            timestamp: Utc::now(),
            interval_ms,
            messages_sent,
            messages_received,
            sent_per_second: rate(messages_sent),
            received_per_second: rate(messages_received),
            total_sent,
            total_received,
            latency: LatencySummary::from_samples(samples),
        }
    }
}

/// Mutable aggregation state; one lock covers counters and samples so a
/// flush observes and resets them together.
#[derive(Debug, Default)]
struct AggregatorState {
    messages_sent: u64,
    messages_received: u64,
    total_sent: u64,
    total_received: u64,
    latency: LatencyWindow,
}

struct FlushTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Accumulates send/receive counts and latency samples and flushes them on
/// a fixed timer.
pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
    interval_ms: AtomicU64,
    sink: Arc<dyn MetricsSink>,
    dimensions: Dimensions,
    latest: RwLock<Option<MetricsSnapshot>>,
    task: Mutex<Option<FlushTask>>,
}

impl MetricsAggregator {
    /// Creates an aggregator that reports to `sink` with the given dimensions.
    pub fn new(sink: Arc<dyn MetricsSink>, dimensions: Dimensions) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            interval_ms: AtomicU64::new(DEFAULT_FLUSH_INTERVAL.as_millis() as u64),
            sink,
            dimensions,
            latest: RwLock::new(None),
            task: Mutex::new(None),
        }
    }

    /// Starts the flush timer. A second call while running is ignored.
    pub fn start(self: &Arc<Self>, flush_interval: Duration) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Metrics aggregator already started");
            return;
        }

        let flush_interval = flush_interval.max(Duration::from_millis(1));
        self.interval_ms
            .store(flush_interval.as_millis() as u64, Ordering::Relaxed);

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let aggregator = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        aggregator.flush();
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }
        });

        info!(
            interval_ms = flush_interval.as_millis() as u64,
            service = %self.dimensions.service,
            "Metrics aggregator started"
        );

        *task = Some(FlushTask { shutdown, handle });
    }

    /// Stops the timer and performs one final flush.
    pub async fn stop(&self) -> MetricsSnapshot {
        let task = self.task.lock().take();

        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Metrics flush task ended abnormally");
            }
        }

        let snapshot = self.flush();
        info!(
            total_sent = snapshot.total_sent,
            total_received = snapshot.total_received,
            "Metrics aggregator stopped"
        );
        snapshot
    }

    /// Whether the flush timer is running.
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Reads and resets the interval window, emits the snapshot to the sink,
    /// and returns it.
    pub fn flush(&self) -> MetricsSnapshot {
        let (sent, received, total_sent, total_received, samples) = {
            let mut state = self.state.lock();
            let sent = std::mem::take(&mut state.messages_sent);
            let received = std::mem::take(&mut state.messages_received);
            let samples = state.latency.take();
            (sent, received, state.total_sent, state.total_received, samples)
        };

        let snapshot = MetricsSnapshot::compute(
            self.interval_ms.load(Ordering::Relaxed),
            sent,
            received,
            total_sent,
            total_received,
            &samples,
        );

        debug!(
            sent = sent,
            received = received,
            samples = samples.len(),
            "Flushed metrics window"
        );

        self.sink.emit(&snapshot, &self.dimensions);
        *self.latest.write() = Some(snapshot.clone());

        snapshot
    }

    /// The most recently flushed snapshot, if any.
    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.latest.read().clone()
    }

    /// Configured flush interval.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Latency samples currently buffered, oldest first.
    pub fn pending_latency_samples(&self) -> Vec<u64> {
        self.state.lock().latency.samples().collect()
    }
}

impl MetricsRecorder for MetricsAggregator {
    fn record_sent(&self, n: u64) {
        let mut state = self.state.lock();
        state.messages_sent += n;
        state.total_sent += n;
    }

    fn record_received(&self, n: u64) {
        let mut state = self.state.lock();
        state.messages_received += n;
        state.total_received += n;
    }

    fn record_latency(&self, ms: i64) {
        if !is_recordable_latency(ms) {
            return;
        }
        self.state.lock().latency.push(ms as u64);
    }
}
