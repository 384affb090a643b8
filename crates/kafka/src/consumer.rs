//! Consumption of a service's topics with latency extraction.
//!
//! Every `(topic, partition)` pair gets its own task reading from the
//! latest offset onward. Records are never replayed and offsets are not
//! committed; the workload only needs to observe what it just produced.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rskafka::client::{
    partition::{OffsetAt, PartitionClient, UnknownTopicHandling},
    Client,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telemetry::{is_recordable_latency, MetricsRecorder};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use workload_core::{Error, Result, ServiceConfig};

use crate::config::ConsumerSettings;

/// A record read from one partition.
#[derive(Debug, Clone)]
pub struct FetchedRecord {
    pub offset: i64,
    pub value: Option<Vec<u8>>,
}

/// Sequential reader over one partition.
#[async_trait]
pub trait PartitionReader: Send + Sync {
    /// Offset the next produced record will get.
    async fn latest_offset(&self) -> Result<i64>;
    /// Records at or after `offset`, waiting up to `max_wait_ms` for data.
    async fn fetch(&self, offset: i64, max_wait_ms: i32) -> Result<Vec<FetchedRecord>>;
}

/// Opens partition readers.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn open(&self, topic: &str, partition: i32) -> Result<Box<dyn PartitionReader>>;
}

/// [`RecordSource`] reading from Kafka through rskafka.
pub struct KafkaRecordSource {
    client: Arc<Client>,
    fetch_max_bytes: i32,
}

impl KafkaRecordSource {
    pub fn new(client: Arc<Client>, fetch_max_bytes: i32) -> Self {
        Self {
            client,
            fetch_max_bytes,
        }
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn open(&self, topic: &str, partition: i32) -> Result<Box<dyn PartitionReader>> {
        let client = self
            .client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| Error::broker(format!("failed to get partition client: {}", e)))?;

        Ok(Box::new(KafkaPartitionReader {
            client,
            max_bytes: self.fetch_max_bytes,
        }))
    }
}

struct KafkaPartitionReader {
    client: PartitionClient,
    max_bytes: i32,
}

#[async_trait]
impl PartitionReader for KafkaPartitionReader {
    async fn latest_offset(&self) -> Result<i64> {
        self.client
            .get_offset(OffsetAt::Latest)
            .await
            .map_err(|e| Error::broker(format!("failed to get offset: {}", e)))
    }

    async fn fetch(&self, offset: i64, max_wait_ms: i32) -> Result<Vec<FetchedRecord>> {
        let (records, _watermark) = self
            .client
            .fetch_records(offset, 1..self.max_bytes, max_wait_ms)
            .await
            .map_err(|e| Error::broker(format!("failed to fetch records: {}", e)))?;

        Ok(records
            .into_iter()
            .map(|r| FetchedRecord {
                offset: r.offset,
                value: r.record.value,
            })
            .collect())
    }
}

/// What happened to one consumed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Latency sample forwarded to the recorder
    Latency(i64),
    /// Latency computed but outside the recordable range
    Discarded(i64),
    /// Body could not be parsed or carried no numeric timestamp
    Malformed,
}

#[derive(Debug, Default)]
struct ConsumerState {
    total_received: u64,
    received_per_topic: BTreeMap<String, u64>,
    received_per_partition: BTreeMap<(String, i32), u64>,
    malformed: u64,
    latency_discarded: u64,
}

/// Counters kept by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStats {
    pub total_received: u64,
    pub received_per_topic: BTreeMap<String, u64>,
    pub malformed: u64,
    pub latency_discarded: u64,
}

/// Status exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatus {
    pub running: bool,
    pub total_received: u64,
    pub received_per_topic: BTreeMap<String, u64>,
    pub topic_count: usize,
    pub max_in_flight: usize,
}

/// Consumes every partition of a service's topics.
pub struct MultiTopicConsumer {
    config: ServiceConfig,
    settings: ConsumerSettings,
    source: Arc<dyn RecordSource>,
    recorder: Arc<dyn MetricsRecorder>,
    state: Mutex<ConsumerState>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MultiTopicConsumer {
    pub fn new(
        config: ServiceConfig,
        source: Arc<dyn RecordSource>,
        recorder: Arc<dyn MetricsRecorder>,
        settings: ConsumerSettings,
    ) -> Self {
        let state = ConsumerState {
            received_per_topic: config.topics().iter().map(|t| (t.clone(), 0)).collect(),
            ..ConsumerState::default()
        };

        Self {
            config,
            settings,
            source,
            recorder,
            state: Mutex::new(state),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Maximum number of partitions read concurrently.
    pub fn max_in_flight(&self) -> usize {
        self.config.total_partitions()
    }

    /// Opens every partition at its latest offset and spawns the readers.
    ///
    /// Returns once every reader is positioned, so records produced after
    /// `start` returns are observed.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::lifecycle("consumer already running"));
        }

        let mut readers = Vec::with_capacity(self.max_in_flight());
        for topic in self.config.topics() {
            for partition in 0..self.config.partitions_per_topic() {
                let opened = async {
                    let reader = self.source.open(topic, partition).await?;
                    let offset = reader.latest_offset().await?;
                    Ok::<_, Error>((reader, offset))
                }
                .await;

                match opened {
                    Ok((reader, offset)) => readers.push((topic.clone(), partition, reader, offset)),
                    Err(e) => {
                        self.running.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
        }

        info!(
            service = %self.config.service_name(),
            topics = self.config.topic_count(),
            partitions = readers.len(),
            "Starting consumer"
        );

        let mut tasks = self.tasks.lock();
        for (topic, partition, reader, offset) in readers {
            let consumer = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                consumer.read_partition(topic, partition, reader, offset).await;
            }));
        }

        Ok(())
    }

    async fn read_partition(
        &self,
        topic: String,
        partition: i32,
        reader: Box<dyn PartitionReader>,
        mut offset: i64,
    ) {
        debug!(topic = %topic, partition = partition, offset = offset, "Partition reader started");

        while self.running.load(Ordering::SeqCst) {
            match reader.fetch(offset, self.settings.max_wait_ms).await {
                Ok(records) => {
                    for record in records {
                        offset = offset.max(record.offset + 1);
                        self.handle_record(&topic, partition, record.value.as_deref());
                    }
                }
                Err(e) => {
                    warn!(topic = %topic, partition = partition, error = %e, "Fetch failed");
                    tokio::time::sleep(self.settings.fetch_backoff()).await;
                }
            }
        }

        debug!(topic = %topic, partition = partition, offset = offset, "Partition reader exited");
    }

    /// Stops every reader once its current fetch returns.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Partition reader ended abnormally");
            }
        }

        info!(total_received = self.stats().total_received, "Consumer stopped");
    }

    /// Counts one record and forwards its latency when in range.
    pub fn handle_record(&self, topic: &str, partition: i32, payload: Option<&[u8]>) -> RecordOutcome {
        self.handle_record_at(topic, partition, payload, Utc::now().timestamp_millis())
    }

    /// [`handle_record`](Self::handle_record) with an explicit receive time.
    pub fn handle_record_at(
        &self,
        topic: &str,
        partition: i32,
        payload: Option<&[u8]>,
        now_ms: i64,
    ) -> RecordOutcome {
        {
            let mut state = self.state.lock();
            state.total_received += 1;
            *state.received_per_topic.entry(topic.to_string()).or_insert(0) += 1;
            *state
                .received_per_partition
                .entry((topic.to_string(), partition))
                .or_insert(0) += 1;
        }
        self.recorder.record_received(1);

        let timestamp = match payload.map(extract_timestamp) {
            Some(Ok(ts)) => ts,
            Some(Err(e)) => return self.malformed(topic, partition, &e),
            None => return self.malformed(topic, partition, &Error::malformed("empty record")),
        };

        let latency = match now_ms.checked_sub(timestamp) {
            Some(latency) => latency,
            None => {
                return self.malformed(topic, partition, &Error::malformed("timestamp out of range"))
            }
        };
        if is_recordable_latency(latency) {
            self.recorder.record_latency(latency);
            RecordOutcome::Latency(latency)
        } else {
            self.state.lock().latency_discarded += 1;
            RecordOutcome::Discarded(latency)
        }
    }

    fn malformed(&self, topic: &str, partition: i32, error: &Error) -> RecordOutcome {
        self.state.lock().malformed += 1;
        debug!(topic = %topic, partition = partition, error = %error, "Skipping malformed record");
        RecordOutcome::Malformed
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ConsumerStats {
        let state = self.state.lock();
        ConsumerStats {
            total_received: state.total_received,
            received_per_topic: state.received_per_topic.clone(),
            malformed: state.malformed,
            latency_discarded: state.latency_discarded,
        }
    }

    pub fn status(&self) -> ConsumerStatus {
        let state = self.state.lock();
        ConsumerStatus {
            running: self.is_running(),
            total_received: state.total_received,
            received_per_topic: state.received_per_topic.clone(),
            topic_count: self.config.topic_count(),
            max_in_flight: self.max_in_flight(),
        }
    }

    /// Received counts keyed by `<topic>-<partition>`.
    pub fn partition_stats(&self) -> BTreeMap<String, u64> {
        self.state
            .lock()
            .received_per_partition
            .iter()
            .map(|((topic, partition), count)| (format!("{}-{}", topic, partition), *count))
            .collect()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// Reads the numeric `timestamp` field of a payload.
fn extract_timestamp(payload: &[u8]) -> Result<i64> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| Error::malformed(e.to_string()))?;

    match value.get("timestamp") {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| Error::malformed("timestamp out of range")),
        Some(_) => Err(Error::malformed("timestamp is not a number")),
        None => Err(Error::malformed("missing timestamp")),
    }
}
