//! Continuous round-robin producer over a service's topics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rskafka::client::{
    partition::{Compression, PartitionClient, UnknownTopicHandling},
    Client,
};
use rskafka::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telemetry::MetricsRecorder;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use workload_core::{Error, Result, ServiceConfig};

use crate::config::ProducerSettings;
use crate::message::{MessageSynthesizer, SizeCheck};
use crate::partitioner::{PartitionSelector, RoundRobin};

/// A record handed to a [`RecordSink`].
#[derive(Debug, Clone)]
pub struct OutgoingRecord {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for produced records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn send(&self, topic: &str, partition: i32, record: OutgoingRecord) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// [`RecordSink`] writing to Kafka through rskafka.
pub struct KafkaRecordSink {
    client: Arc<Client>,
    /// Cached partition clients per (topic, partition)
    clients: RwLock<BTreeMap<(String, i32), Arc<PartitionClient>>>,
}

impl KafkaRecordSink {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            clients: RwLock::new(BTreeMap::new()),
        }
    }

    async fn get_client(&self, topic: &str, partition: i32) -> Result<Arc<PartitionClient>> {
        let key = (topic.to_string(), partition);

        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        let partition_client = self
            .client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| Error::send(format!("failed to get partition client: {}", e)))?;
        let partition_client = Arc::new(partition_client);

        self.clients.write().await.insert(key, partition_client.clone());

        Ok(partition_client)
    }
}

#[async_trait]
impl RecordSink for KafkaRecordSink {
    async fn send(&self, topic: &str, partition: i32, record: OutgoingRecord) -> Result<()> {
        let client = self.get_client(topic, partition).await?;

        let record = Record {
            key: record.key,
            value: Some(record.value),
            headers: BTreeMap::new(),
            timestamp: record.timestamp,
        };

        match client.produce(vec![record], Compression::NoCompression).await {
            Ok(_offsets) => Ok(()),
            Err(e) => {
                // Drop the cached client so the next attempt reconnects.
                self.clients.write().await.remove(&(topic.to_string(), partition));
                Err(Error::send(format!("failed to produce: {}", e)))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.clients.write().await.clear();
        Ok(())
    }
}

/// Result of one successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub topic: String,
    pub partition: i32,
    pub sequence: u64,
    pub bytes: usize,
    pub size_check: SizeCheck,
}

#[derive(Debug)]
struct ProducerState {
    cursor: RoundRobin<String>,
    selector: PartitionSelector,
    sequence: u64,
    total_sent: u64,
    sent_per_topic: BTreeMap<String, u64>,
    failed_sends: u64,
    failed_per_topic: BTreeMap<String, u64>,
    size_exceeded: u64,
}

impl ProducerState {
    fn new(config: &ServiceConfig, settings: &ProducerSettings) -> Self {
        let zeroed: BTreeMap<String, u64> =
            config.topics().iter().map(|t| (t.clone(), 0)).collect();
        Self {
            cursor: RoundRobin::new(config.topics().to_vec()),
            selector: PartitionSelector::new(
                settings.partition_strategy,
                config.partitions_per_topic(),
            ),
            sequence: 0,
            total_sent: 0,
            sent_per_topic: zeroed.clone(),
            failed_sends: 0,
            failed_per_topic: zeroed,
            size_exceeded: 0,
        }
    }
}

/// Counters kept by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerStats {
    pub total_sent: u64,
    pub sent_per_topic: BTreeMap<String, u64>,
    pub failed_sends: u64,
    pub failed_per_topic: BTreeMap<String, u64>,
    pub size_exceeded: u64,
    pub current_topic_index: usize,
}

/// Status exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerStatus {
    pub running: bool,
    pub total_sent: u64,
    pub sent_per_topic: BTreeMap<String, u64>,
    pub current_topic: Option<String>,
    pub topic_count: usize,
    pub failed_sends: u64,
}

/// Produces synthetic records round-robin across a service's topics.
pub struct MultiTopicProducer {
    config: ServiceConfig,
    settings: ProducerSettings,
    synthesizer: MessageSynthesizer,
    sink: Arc<dyn RecordSink>,
    recorder: Arc<dyn MetricsRecorder>,
    state: Mutex<ProducerState>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MultiTopicProducer {
    pub fn new(
        config: ServiceConfig,
        sink: Arc<dyn RecordSink>,
        recorder: Arc<dyn MetricsRecorder>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            synthesizer: MessageSynthesizer::new(&config),
            state: Mutex::new(ProducerState::new(&config, &settings)),
            config,
            settings,
            sink,
            recorder,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Starts the production loop.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::lifecycle("producer already running"));
        }

        let first = self.config.topics().first().cloned().unwrap_or_default();
        match self.synthesizer.minimum_size(&first) {
            Ok(minimum) if minimum > self.synthesizer.target_size() => warn!(
                service = %self.config.service_name(),
                target = self.synthesizer.target_size(),
                minimum = minimum,
                "Configured message size cannot be met exactly"
            ),
            Ok(minimum) => debug!(minimum = minimum, "Minimum exact message size"),
            Err(e) => debug!(error = %e, "Could not compute minimum message size"),
        }

        info!(
            service = %self.config.service_name(),
            topics = self.config.topic_count(),
            message_size = self.config.message_size_bytes(),
            "Starting producer"
        );

        let producer = Arc::clone(self);
        let backoff = self.settings.send_backoff();

        let handle = tokio::spawn(async move {
            while producer.running.load(Ordering::SeqCst) {
                match producer.send_one().await {
                    Ok(_) => tokio::task::yield_now().await,
                    Err(e) => {
                        warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "Send failed");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
            debug!("Production loop exited");
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stops the loop after the in-flight send, then closes the sink.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Production task ended abnormally");
            }
        }

        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "Failed to close record sink");
        }

        let stats = self.stats();
        info!(
            total_sent = stats.total_sent,
            failed_sends = stats.failed_sends,
            "Producer stopped"
        );
    }

    /// Synthesizes and sends one record to the next topic in order.
    pub async fn send_one(&self) -> Result<SendOutcome> {
        let now = Utc::now();
        let (topic, sequence) = {
            let mut state = self.state.lock();
            let topic = state.cursor.next_item()?.clone();
            let sequence = state.sequence;
            state.sequence += 1;
            (topic, sequence)
        };

        let message = self
            .synthesizer
            .synthesize(&topic, sequence, now.timestamp_millis())?;
        let partition = self.state.lock().selector.select(&topic, &message.id);
        let bytes = message.len();
        let size_check = message.size_check;

        let record = OutgoingRecord {
            key: Some(message.id.into_bytes()),
            value: message.payload,
            timestamp: now,
        };

        match self.sink.send(&topic, partition, record).await {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    state.total_sent += 1;
                    *state.sent_per_topic.entry(topic.clone()).or_insert(0) += 1;
                    if size_check.is_exceeded() {
                        state.size_exceeded += 1;
                    }
                }
                self.recorder.record_sent(1);
                Ok(SendOutcome {
                    topic,
                    partition,
                    sequence,
                    bytes,
                    size_check,
                })
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.failed_sends += 1;
                *state.failed_per_topic.entry(topic).or_insert(0) += 1;
                Err(e)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ProducerStats {
        let state = self.state.lock();
        ProducerStats {
            total_sent: state.total_sent,
            sent_per_topic: state.sent_per_topic.clone(),
            failed_sends: state.failed_sends,
            failed_per_topic: state.failed_per_topic.clone(),
            size_exceeded: state.size_exceeded,
            current_topic_index: state.cursor.cursor(),
        }
    }

    pub fn status(&self) -> ProducerStatus {
        let state = self.state.lock();
        ProducerStatus {
            running: self.is_running(),
            total_sent: state.total_sent,
            sent_per_topic: state.sent_per_topic.clone(),
            current_topic: state.cursor.current().cloned(),
            topic_count: state.cursor.len(),
            failed_sends: state.failed_sends,
        }
    }

    /// Zeroes every counter and rewinds the cursor.
    pub fn reset_stats(&self) {
        *self.state.lock() = ProducerState::new(&self.config, &self.settings);
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
