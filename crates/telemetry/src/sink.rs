//! Destinations for flushed metrics snapshots.
//!
//! A sink receives every snapshot the aggregator flushes, already broken
//! down into named data points with service/environment dimensions. The
//! transport behind the sink is up to the implementation.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics::MetricsSnapshot;

/// Dimensions attached to every data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub service: String,
    pub service_index: u32,
    pub environment: String,
}

impl Dimensions {
    pub fn new(service: impl Into<String>, service_index: u32, environment: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            service_index,
            environment: environment.into(),
        }
    }

    /// Dimensions as name/value pairs.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Service", self.service.clone()),
            ("ServiceIndex", self.service_index.to_string()),
            ("Environment", self.environment.clone()),
        ]
    }
}

/// Unit of a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Count,
    CountPerSecond,
    Milliseconds,
}

/// One named numeric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
}

impl DataPoint {
    const fn new(name: &'static str, value: f64, unit: Unit) -> Self {
        Self { name, value, unit }
    }
}

impl MetricsSnapshot {
    /// Breaks the snapshot into data points. Latency points are present only
    /// when the window held samples.
    pub fn data_points(&self) -> Vec<DataPoint> {
        let mut points = vec![
            DataPoint::new("MessagesSentPerSecond", self.sent_per_second, Unit::CountPerSecond),
            DataPoint::new(
                "MessagesReceivedPerSecond",
                self.received_per_second,
                Unit::CountPerSecond,
            ),
            DataPoint::new("TotalMessagesSent", self.total_sent as f64, Unit::Count),
            DataPoint::new("TotalMessagesReceived", self.total_received as f64, Unit::Count),
        ];

        if let Some(latency) = &self.latency {
            points.extend([
                DataPoint::new("LatencyAvg", latency.avg, Unit::Milliseconds),
                DataPoint::new("LatencyMin", latency.min as f64, Unit::Milliseconds),
                DataPoint::new("LatencyMax", latency.max as f64, Unit::Milliseconds),
                DataPoint::new("LatencyP95", latency.p95 as f64, Unit::Milliseconds),
                DataPoint::new("LatencyP99", latency.p99 as f64, Unit::Milliseconds),
            ]);
        }

        points
    }
}

/// Receives flushed snapshots.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, snapshot: &MetricsSnapshot, dimensions: &Dimensions);
}

/// Sink that drops snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn emit(&self, _snapshot: &MetricsSnapshot, _dimensions: &Dimensions) {}
}

/// Sink that writes each snapshot as one structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn emit(&self, snapshot: &MetricsSnapshot, dimensions: &Dimensions) {
        let dims = dimensions
            .pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        let points = snapshot
            .data_points()
            .iter()
            .map(|p| format!("{}={:.2}", p.name, p.value))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            dimensions = %dims,
            interval_ms = snapshot.interval_ms,
            latency_samples = snapshot.latency.as_ref().map(|l| l.samples).unwrap_or(0),
            "Workload stats: {}",
            points
        );
    }
}
