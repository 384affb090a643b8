//! In-memory broker and capturing sinks for testing.

use async_trait::async_trait;
use kafka::{
    FetchedRecord, OutgoingRecord, PartitionReader, RecordSink, RecordSource, TopicAdmin,
    TopicDescription, TopicSpec,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{Dimensions, MetricsSink, MetricsSnapshot};
use tokio::sync::Notify;
use workload_core::{Error, Result};

type PartitionLog = Vec<Vec<u8>>;

#[derive(Default)]
struct BrokerInner {
    topics: Mutex<BTreeMap<String, Vec<PartitionLog>>>,
    created: Mutex<Vec<TopicSpec>>,
    fail_connect: AtomicBool,
    fail_sends: AtomicBool,
    send_attempts: AtomicU64,
    send_delay: Mutex<Duration>,
    appended: Notify,
}

/// Broker kept entirely in memory.
///
/// Implements the same `TopicAdmin`, `RecordSink` and `RecordSource` traits
/// as the rskafka-backed types, so provisioning, production and consumption
/// run their real code paths without a network.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-creates a topic, bypassing the admin API.
    pub fn with_topic(self, name: &str, partitions: usize) -> Self {
        self.inner
            .topics
            .lock()
            .insert(name.to_string(), vec![Vec::new(); partitions]);
        self
    }

    /// Slows every send, keeping continuous producer loops bounded.
    pub fn with_send_delay(self, delay: Duration) -> Self {
        *self.inner.send_delay.lock() = delay;
        self
    }

    pub fn partition_count(&self, topic: &str) -> Option<usize> {
        self.inner.topics.lock().get(topic).map(|p| p.len())
    }

    /// Topics created through the admin API, in creation order.
    pub fn created_topics(&self) -> Vec<TopicSpec> {
        self.inner.created.lock().clone()
    }

    /// Records on one partition, oldest first.
    pub fn records(&self, topic: &str, partition: usize) -> Vec<Vec<u8>> {
        self.inner
            .topics
            .lock()
            .get(topic)
            .and_then(|p| p.get(partition))
            .cloned()
            .unwrap_or_default()
    }

    /// Records across every partition of a topic.
    pub fn topic_records(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map(|p| p.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_records(&self) -> usize {
        self.inner
            .topics
            .lock()
            .values()
            .flat_map(|p| p.iter())
            .map(|log| log.len())
            .sum()
    }

    pub fn send_attempts(&self) -> u64 {
        self.inner.send_attempts.load(Ordering::SeqCst)
    }

    /// Appends a raw record, as another producer on the topic would.
    pub fn inject(&self, topic: &str, partition: usize, value: &[u8]) {
        if let Some(log) = self
            .inner
            .topics
            .lock()
            .get_mut(topic)
            .and_then(|p| p.get_mut(partition))
        {
            log.push(value.to_vec());
        }
        self.inner.appended.notify_waiters();
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TopicAdmin for InMemoryBroker {
    async fn connect(&self) -> Result<()> {
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::broker("connection refused"));
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        Ok(self.inner.topics.lock().keys().cloned().collect())
    }

    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription> {
        let partitions = self
            .partition_count(topic)
            .ok_or_else(|| Error::broker(format!("unknown topic {}", topic)))?;
        Ok(TopicDescription {
            name: topic.to_string(),
            partitions: partitions as i32,
        })
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let mut topics = self.inner.topics.lock();
        if topics.contains_key(&spec.name) {
            return Err(Error::broker(format!("topic {} already exists", spec.name)));
        }
        topics.insert(spec.name.clone(), vec![Vec::new(); spec.partitions as usize]);
        self.inner.created.lock().push(spec.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RecordSink for InMemoryBroker {
    async fn send(&self, topic: &str, partition: i32, record: OutgoingRecord) -> Result<()> {
        let delay = *self.inner.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.inner.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::send("broker unavailable"));
        }

        {
            let mut topics = self.inner.topics.lock();
            let log = topics
                .get_mut(topic)
                .and_then(|p| p.get_mut(partition as usize))
                .ok_or_else(|| Error::send(format!("unknown partition {}-{}", topic, partition)))?;
            log.push(record.value);
        }

        self.inner.appended.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RecordSource for InMemoryBroker {
    async fn open(&self, topic: &str, partition: i32) -> Result<Box<dyn PartitionReader>> {
        let exists = self
            .partition_count(topic)
            .map(|n| (partition as usize) < n)
            .unwrap_or(false);
        if !exists {
            return Err(Error::broker(format!("unknown partition {}-{}", topic, partition)));
        }

        Ok(Box::new(InMemoryReader {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            partition: partition as usize,
        }))
    }
}

struct InMemoryReader {
    inner: Arc<BrokerInner>,
    topic: String,
    partition: usize,
}

impl InMemoryReader {
    fn read_from(&self, offset: i64) -> Vec<FetchedRecord> {
        let topics = self.inner.topics.lock();
        let log = match topics.get(&self.topic).and_then(|p| p.get(self.partition)) {
            Some(log) => log,
            None => return Vec::new(),
        };

        log.iter()
            .enumerate()
            .skip(offset.max(0) as usize)
            .map(|(i, value)| FetchedRecord {
                offset: i as i64,
                value: Some(value.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl PartitionReader for InMemoryReader {
    async fn latest_offset(&self) -> Result<i64> {
        Ok(self
            .inner
            .topics
            .lock()
            .get(&self.topic)
            .and_then(|p| p.get(self.partition))
            .map(|log| log.len() as i64)
            .unwrap_or(0))
    }

    async fn fetch(&self, offset: i64, max_wait_ms: i32) -> Result<Vec<FetchedRecord>> {
        let appended = self.inner.appended.notified();

        let records = self.read_from(offset);
        if !records.is_empty() {
            return Ok(records);
        }

        let wait = Duration::from_millis(max_wait_ms.max(1) as u64);
        let _ = tokio::time::timeout(wait, appended).await;
        Ok(self.read_from(offset))
    }
}

/// Metrics sink that keeps every emitted snapshot.
#[derive(Clone, Default)]
pub struct CapturingSink {
    snapshots: Arc<Mutex<Vec<(MetricsSnapshot, Dimensions)>>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
        self.snapshots.lock().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn last_dimensions(&self) -> Option<Dimensions> {
        self.snapshots.lock().last().map(|(_, d)| d.clone())
    }

    pub fn count(&self) -> usize {
        self.snapshots.lock().len()
    }
}

impl MetricsSink for CapturingSink {
    fn emit(&self, snapshot: &MetricsSnapshot, dimensions: &Dimensions) {
        self.snapshots
            .lock()
            .push((snapshot.clone(), dimensions.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(value: &[u8]) -> OutgoingRecord {
        OutgoingRecord {
            key: None,
            value: value.to_vec(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broker_appends_and_reads() {
        let broker = InMemoryBroker::new().with_topic("t", 2);
        broker.send("t", 1, record(b"a")).await.unwrap();
        broker.send("t", 1, record(b"b")).await.unwrap();

        let reader = broker.open("t", 1).await.unwrap();
        assert_eq!(reader.latest_offset().await.unwrap(), 2);
        let records = reader.fetch(1, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, 1);
        assert_eq!(records[0].value.as_deref(), Some(&b"b"[..]));
    }

    #[tokio::test]
    async fn test_broker_rejects_unknown_partition() {
        let broker = InMemoryBroker::new().with_topic("t", 1);
        assert!(broker.send("t", 3, record(b"a")).await.is_err());
        assert!(broker.open("missing", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_wakes_on_append() {
        let broker = InMemoryBroker::new().with_topic("t", 1);
        let reader = broker.open("t", 0).await.unwrap();

        let writer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.send("t", 0, record(b"late")).await.unwrap();
        });

        let records = reader.fetch(0, 5_000).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
