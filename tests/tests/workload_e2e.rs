//! End-to-end tests for the produce/consume/aggregate pipeline.
//!
//! Runs against the in-memory broker; the final test exercises a real
//! Redpanda container and is ignored by default.

use integration_tests::containers::TestBroker;
use integration_tests::fixtures::{self, payload_aged};
use integration_tests::mocks::{CapturingSink, InMemoryBroker};
use integration_tests::setup::TestContext;
use kafka::{
    ConsumerSettings, KafkaRecordSink, KafkaRecordSource, MultiTopicConsumer, MultiTopicProducer,
    ProducerSettings, ProvisioningSettings, RskafkaAdmin, TopicProvisioner,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{Dimensions, MetricsAggregator};
use worker::{WorkloadDeps, WorkloadService};
use workload_core::ServiceConfig;

struct Pipeline {
    broker: InMemoryBroker,
    metrics: CapturingSink,
    aggregator: Arc<MetricsAggregator>,
    producer: Arc<MultiTopicProducer>,
    consumer: Arc<MultiTopicConsumer>,
}

/// Provisions the topics and wires producer and consumer by hand, without
/// starting the continuous send loop.
async fn pipeline(config: ServiceConfig) -> Pipeline {
    let broker = InMemoryBroker::new();
    let report = TopicProvisioner::new(Arc::new(broker.clone()), ProvisioningSettings::default())
        .provision(config.topics(), config.partitions_per_topic())
        .await;
    assert!(report.is_success());

    let metrics = CapturingSink::new();
    let aggregator = Arc::new(MetricsAggregator::new(
        Arc::new(metrics.clone()),
        Dimensions::new(config.service_name(), config.service_index(), "test"),
    ));
    let settings = fixtures::fast_settings();

    let producer = Arc::new(MultiTopicProducer::new(
        config.clone(),
        Arc::new(broker.clone()),
        aggregator.clone(),
        settings.producer,
    ));
    let consumer = Arc::new(MultiTopicConsumer::new(
        config,
        Arc::new(broker.clone()),
        aggregator.clone(),
        settings.consumer,
    ));

    Pipeline {
        broker,
        metrics,
        aggregator,
        producer,
        consumer,
    }
}

async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Ten sends over two topics split evenly and wrap the cursor
#[tokio::test]
async fn test_round_robin_across_two_topics() {
    let p = pipeline(fixtures::two_topic_config()).await;
    assert_eq!(p.broker.partition_count("t0"), Some(3));
    assert_eq!(p.broker.partition_count("t1"), Some(3));

    for _ in 0..10 {
        p.producer.send_one().await.unwrap();
    }

    let stats = p.producer.stats();
    let expected: BTreeMap<String, u64> = [("t0".to_string(), 5), ("t1".to_string(), 5)]
        .into_iter()
        .collect();
    assert_eq!(stats.total_sent, 10);
    assert_eq!(stats.sent_per_topic, expected);
    assert_eq!(stats.current_topic_index, 0);

    assert_eq!(p.broker.topic_records("t0").len(), 5);
    assert_eq!(p.broker.topic_records("t1").len(), 5);
}

/// Records land on every partition of a topic
#[tokio::test]
async fn test_sends_spread_over_partitions() {
    let p = pipeline(fixtures::service_config(&["only"], 3, 512)).await;

    for _ in 0..9 {
        p.producer.send_one().await.unwrap();
    }

    for partition in 0..3 {
        assert_eq!(p.broker.records("only", partition).len(), 3);
    }
}

/// Every stored record has exactly the configured size
#[tokio::test]
async fn test_stored_records_are_size_exact() {
    let p = pipeline(fixtures::service_config(&["t0", "t1"], 2, 2048)).await;

    for _ in 0..6 {
        p.producer.send_one().await.unwrap();
    }

    let records: Vec<_> = ["t0", "t1"]
        .iter()
        .flat_map(|t| p.broker.topic_records(t))
        .collect();
    assert_eq!(records.len(), 6);
    for record in records {
        assert_eq!(record.len(), 2048);
        let value: serde_json::Value = serde_json::from_slice(&record).unwrap();
        assert_eq!(value["size"], 2048);
        assert_eq!(value["serviceName"], "loadtest");
        assert!(value["padding"].is_string());
    }
}

/// Produced records are consumed back with latency samples
#[tokio::test]
async fn test_consumer_receives_produced_records() {
    let p = pipeline(fixtures::two_topic_config()).await;
    p.consumer.start().await.unwrap();

    for _ in 0..8 {
        p.producer.send_one().await.unwrap();
    }

    let consumer = p.consumer.clone();
    assert!(wait_until(Duration::from_secs(5), || consumer.stats().total_received >= 8).await);

    let stats = p.consumer.stats();
    assert_eq!(stats.total_received, 8);
    assert_eq!(stats.received_per_topic.get("t0"), Some(&4));
    assert_eq!(stats.received_per_topic.get("t1"), Some(&4));
    assert_eq!(stats.malformed, 0);

    let partitions = p.consumer.partition_stats();
    assert_eq!(partitions.values().sum::<u64>(), 8);
    assert!(partitions.keys().all(|k| k.starts_with("t0-") || k.starts_with("t1-")));

    p.consumer.stop().await;

    let snapshot = p.aggregator.flush();
    assert_eq!(snapshot.total_sent, 8);
    assert_eq!(snapshot.total_received, 8);
    let latency = snapshot.latency.expect("latency samples recorded");
    assert_eq!(latency.samples, 8);
    assert!(latency.min <= latency.max);
    assert_eq!(p.metrics.count(), 1);
}

/// Records already on the topic before start are not replayed
#[tokio::test]
async fn test_consumer_starts_at_latest_offset() {
    let p = pipeline(fixtures::service_config(&["t0"], 1, 512)).await;
    p.broker.inject("t0", 0, &payload_aged(5));
    p.broker.inject("t0", 0, &payload_aged(5));

    p.consumer.start().await.unwrap();
    p.producer.send_one().await.unwrap();

    let consumer = p.consumer.clone();
    assert!(wait_until(Duration::from_secs(5), || consumer.stats().total_received >= 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(p.consumer.stats().total_received, 1);

    p.consumer.stop().await;
}

/// Malformed records count as received but add no latency
#[tokio::test]
async fn test_malformed_records_skip_latency() {
    let p = pipeline(fixtures::service_config(&["t0"], 1, 512)).await;
    p.consumer.start().await.unwrap();

    p.broker.inject("t0", 0, b"not json");
    p.broker.inject("t0", 0, br#"{"id":"x"}"#);
    p.broker.inject("t0", 0, &payload_aged(25));

    let consumer = p.consumer.clone();
    assert!(wait_until(Duration::from_secs(5), || consumer.stats().total_received >= 3).await);
    p.consumer.stop().await;

    let stats = p.consumer.stats();
    assert_eq!(stats.total_received, 3);
    assert_eq!(stats.malformed, 2);

    let snapshot = p.aggregator.flush();
    assert_eq!(snapshot.total_received, 3);
    assert_eq!(snapshot.latency.map(|l| l.samples), Some(1));
}

/// Latencies from skewed clocks are dropped from the summary
#[tokio::test]
async fn test_out_of_range_latency_discarded() {
    let p = pipeline(fixtures::service_config(&["t0"], 1, 512)).await;
    p.consumer.start().await.unwrap();

    // Ten minutes in the future yields a negative latency
    p.broker.inject("t0", 0, &payload_aged(-600_000));

    let consumer = p.consumer.clone();
    assert!(wait_until(Duration::from_secs(5), || consumer.stats().total_received >= 1).await);
    p.consumer.stop().await;

    assert_eq!(p.consumer.stats().latency_discarded, 1);
    assert!(p.aggregator.flush().latency.is_none());
}

/// Failed sends are counted but never move total_sent
#[tokio::test]
async fn test_send_failures_plateau_total() {
    let ctx = TestContext::new();
    ctx.service.start().await.unwrap();

    let producer = ctx.service.producer().clone();
    assert!(wait_until(Duration::from_secs(5), || producer.stats().total_sent > 0).await);

    ctx.broker.set_fail_sends(true);
    // Let any in-flight send settle
    tokio::time::sleep(Duration::from_millis(30)).await;
    let plateau = ctx.service.producer().stats().total_sent;

    let producer = ctx.service.producer().clone();
    assert!(wait_until(Duration::from_secs(5), || producer.stats().failed_sends >= 3).await);
    assert_eq!(ctx.service.producer().stats().total_sent, plateau);
    assert!(ctx.service.producer().is_running());

    ctx.broker.set_fail_sends(false);
    let producer = ctx.service.producer().clone();
    assert!(wait_until(Duration::from_secs(5), || producer.stats().total_sent > plateau).await);

    ctx.service.stop().await;
}

/// Stopping flushes whatever accumulated since the last timer tick
#[tokio::test]
async fn test_stop_emits_final_flush() {
    let ctx = TestContext::new();
    ctx.service.start().await.unwrap();

    assert!(ctx.wait_for_received(20, Duration::from_secs(5)).await);
    assert_eq!(ctx.metrics.count(), 0);

    let snapshot = ctx.service.stop().await;

    assert_eq!(ctx.metrics.count(), 1);
    assert_eq!(snapshot.total_sent, ctx.service.producer().stats().total_sent);
    assert_eq!(
        snapshot.total_received,
        ctx.service.consumer().stats().total_received
    );
    assert!(snapshot.total_received >= 20);
    assert!(snapshot.latency.is_some());

    let dims = ctx.metrics.last_dimensions().unwrap();
    assert_eq!(dims.service, "loadtest");

    // Nothing moves once stopped
    let sent = ctx.service.producer().stats().total_sent;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ctx.service.producer().stats().total_sent, sent);
    assert!(!ctx.service.aggregator().is_running());
}

/// Full loop against a live broker
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_workload_against_redpanda() {
    let broker = TestBroker::start().await;
    let config = fixtures::service_config(&["it-e2e-0", "it-e2e-1"], 2, 1024);
    let metrics = CapturingSink::new();

    let deps = WorkloadDeps {
        admin: Arc::new(RskafkaAdmin::new(broker.client.clone(), 10_000)),
        sink: Arc::new(KafkaRecordSink::new(broker.client.clone())),
        source: Arc::new(KafkaRecordSource::new(broker.client.clone(), 4 * 1024 * 1024)),
        metrics_sink: Arc::new(metrics.clone()),
    };
    let mut settings = fixtures::fast_settings();
    settings.provisioning.replication_factor = 1;
    settings.producer = ProducerSettings::default();
    settings.consumer = ConsumerSettings {
        max_wait_ms: 100,
        ..ConsumerSettings::default()
    };

    let service = WorkloadService::new(config, deps, settings);
    service.start().await.unwrap();

    let consumer = service.consumer().clone();
    assert!(wait_until(Duration::from_secs(30), || consumer.stats().total_received >= 50).await);

    let snapshot = service.stop().await;
    assert!(snapshot.total_sent >= snapshot.total_received);
    assert!(snapshot.latency.is_some());
}
