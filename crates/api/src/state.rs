//! Application state shared across handlers.

use kafka::{ConsumerStatus, ProducerStatus, ProvisioningReport};
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::{HealthReport, MetricsSnapshot};
use workload_core::ServiceConfigView;

/// Narrow readiness capability of a running workload.
pub trait ReadinessProbe: Send + Sync {
    /// Provisioning succeeded and both loops are running.
    fn is_ready(&self) -> bool;
    fn config(&self) -> ServiceConfigView;
}

/// Read-only access to producer, consumer and aggregator state.
pub trait StatusSource: Send + Sync {
    fn health(&self) -> HealthReport;
    fn producer_status(&self) -> ProducerStatus;
    fn consumer_status(&self) -> ConsumerStatus;
    fn partition_stats(&self) -> BTreeMap<String, u64>;
    fn latest_snapshot(&self) -> Option<MetricsSnapshot>;
    /// Outcome of the last provisioning run, if one has completed.
    fn provisioning_report(&self) -> Option<ProvisioningReport>;
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<dyn ReadinessProbe>,
    pub status: Arc<dyn StatusSource>,
}

impl AppState {
    pub fn new(readiness: Arc<dyn ReadinessProbe>, status: Arc<dyn StatusSource>) -> Self {
        Self { readiness, status }
    }

    /// State where one object provides both capabilities.
    pub fn from_service<S>(service: Arc<S>) -> Self
    where
        S: ReadinessProbe + StatusSource + 'static,
    {
        Self {
            readiness: service.clone(),
            status: service,
        }
    }
}
