//! The workload service: one producer, one consumer and one aggregator
//! sharing a validated [`ServiceConfig`].

use api::{ReadinessProbe, StatusSource};
use kafka::{
    ConsumerSettings, ConsumerStatus, MultiTopicConsumer, MultiTopicProducer, ProducerSettings,
    ProducerStatus, ProvisioningReport, ProvisioningSettings, RecordSink, RecordSource,
    TopicAdmin, TopicProvisioner,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{
    Dimensions, HealthRegistry, HealthReport, MetricsAggregator, MetricsSink, MetricsSnapshot,
    DEFAULT_FLUSH_INTERVAL,
};
use tracing::{error, info, warn};
use workload_core::{Error, Result, ServiceConfig, ServiceConfigView};

/// Broker-facing collaborators of a service.
#[derive(Clone)]
pub struct WorkloadDeps {
    pub admin: Arc<dyn TopicAdmin>,
    pub sink: Arc<dyn RecordSink>,
    pub source: Arc<dyn RecordSource>,
    pub metrics_sink: Arc<dyn MetricsSink>,
}

/// Tunables for one service.
#[derive(Debug, Clone)]
pub struct WorkloadSettings {
    pub environment: String,
    pub flush_interval: Duration,
    pub provisioning: ProvisioningSettings,
    pub producer: ProducerSettings,
    pub consumer: ConsumerSettings,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            provisioning: ProvisioningSettings::default(),
            producer: ProducerSettings::default(),
            consumer: ConsumerSettings::default(),
        }
    }
}

/// Runs one service end to end.
pub struct WorkloadService {
    config: ServiceConfig,
    flush_interval: Duration,
    provisioner: TopicProvisioner,
    aggregator: Arc<MetricsAggregator>,
    producer: Arc<MultiTopicProducer>,
    consumer: Arc<MultiTopicConsumer>,
    health: HealthRegistry,
    provisioning: Mutex<Option<ProvisioningReport>>,
}

impl WorkloadService {
    pub fn new(config: ServiceConfig, deps: WorkloadDeps, settings: WorkloadSettings) -> Self {
        let dimensions = Dimensions::new(
            config.service_name(),
            config.service_index(),
            settings.environment.clone(),
        );
        let aggregator = Arc::new(MetricsAggregator::new(deps.metrics_sink, dimensions));

        let producer = Arc::new(MultiTopicProducer::new(
            config.clone(),
            deps.sink,
            aggregator.clone(),
            settings.producer,
        ));
        let consumer = Arc::new(MultiTopicConsumer::new(
            config.clone(),
            deps.source,
            aggregator.clone(),
            settings.consumer,
        ));

        Self {
            provisioner: TopicProvisioner::new(deps.admin, settings.provisioning),
            flush_interval: settings.flush_interval,
            config,
            aggregator,
            producer,
            consumer,
            health: HealthRegistry::new(),
            provisioning: Mutex::new(None),
        }
    }

    /// Provisions topics, then starts aggregator, consumer and producer.
    ///
    /// Any failed topic aborts startup with [`Error::Provisioning`] before
    /// anything is produced.
    pub async fn start(&self) -> Result<ProvisioningReport> {
        info!(
            service = %self.config.service_name(),
            index = self.config.service_index(),
            topics = self.config.topic_count(),
            partitions_per_topic = self.config.partitions_per_topic(),
            message_size = self.config.message_size_bytes(),
            "Starting workload service"
        );

        let report = self
            .provisioner
            .provision(self.config.topics(), self.config.partitions_per_topic())
            .await;
        *self.provisioning.lock() = Some(report.clone());

        if report.broker_reachable {
            self.health.broker.set_healthy();
        } else {
            self.health.broker.set_unhealthy("broker unreachable");
        }

        if let Err(e) = report.clone().into_result() {
            self.health.topics.set_unhealthy(e.to_string());
            error!(error = %e, "Provisioning failed, not starting workload");
            return Err(e);
        }
        self.health.topics.set_healthy();

        self.aggregator.start(self.flush_interval);

        if let Err(e) = self.consumer.start().await {
            self.health.consumer.set_unhealthy(e.to_string());
            self.aggregator.stop().await;
            return Err(e);
        }
        self.health.consumer.set_healthy();

        if let Err(e) = self.producer.start() {
            self.health.producer.set_unhealthy(e.to_string());
            self.consumer.stop().await;
            self.aggregator.stop().await;
            return Err(e);
        }
        self.health.producer.set_healthy();

        info!(
            service = %self.config.service_name(),
            created = report.created(),
            "Workload service running"
        );
        Ok(report)
    }

    /// Stops producer, consumer and aggregator in that order.
    ///
    /// Returns the final statistics flush.
    pub async fn stop(&self) -> MetricsSnapshot {
        self.producer.stop().await;
        self.health.producer.set_unhealthy("stopped");

        self.consumer.stop().await;
        self.health.consumer.set_unhealthy("stopped");

        let snapshot = self.aggregator.stop().await;
        info!(
            service = %self.config.service_name(),
            total_sent = snapshot.total_sent,
            total_received = snapshot.total_received,
            "Workload service stopped"
        );
        snapshot
    }

    /// [`stop`](Self::stop) bounded by `timeout`.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> Result<MetricsSnapshot> {
        match tokio::time::timeout(timeout, self.stop()).await {
            Ok(snapshot) => Ok(snapshot),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Workload stop timed out");
                Err(Error::lifecycle(format!(
                    "stop did not complete within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn producer(&self) -> &Arc<MultiTopicProducer> {
        &self.producer
    }

    pub fn consumer(&self) -> &Arc<MultiTopicConsumer> {
        &self.consumer
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    pub fn health_registry(&self) -> &HealthRegistry {
        &self.health
    }

    /// Report from the last provisioning run.
    pub fn provisioning_report(&self) -> Option<ProvisioningReport> {
        self.provisioning.lock().clone()
    }
}

impl ReadinessProbe for WorkloadService {
    fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    fn config(&self) -> ServiceConfigView {
        self.config.view()
    }
}

impl StatusSource for WorkloadService {
    fn health(&self) -> HealthReport {
        self.health.report()
    }

    fn producer_status(&self) -> ProducerStatus {
        self.producer.status()
    }

    fn consumer_status(&self) -> ConsumerStatus {
        self.consumer.status()
    }

    fn partition_stats(&self) -> BTreeMap<String, u64> {
        self.consumer.partition_stats()
    }

    fn latest_snapshot(&self) -> Option<MetricsSnapshot> {
        self.aggregator.latest()
    }

    fn provisioning_report(&self) -> Option<ProvisioningReport> {
        self.provisioning.lock().clone()
    }
}
