//! Testcontainer setup for a single-node Redpanda broker.
//!
//! Tests using this are `#[ignore]`d by default; run them with
//! `cargo test -- --ignored` on a host with Docker. Set
//! `WORKLOAD_TEST_BROKERS` to reuse an existing broker instead.

use kafka::BrokerConfig;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const REDPANDA_IMAGE: &str = "redpandadata/redpanda";
const REDPANDA_TAG: &str = "v24.1.7";
const HOST_KAFKA_PORT: u16 = 19092;

/// Broker handle; the container stops when this is dropped.
pub struct TestBroker {
    #[allow(dead_code)]
    redpanda: Option<ContainerAsync<GenericImage>>,
    pub client: Arc<rskafka::client::Client>,
    pub config: BrokerConfig,
}

impl TestBroker {
    /// Starts Redpanda, or connects to `WORKLOAD_TEST_BROKERS` when set.
    pub async fn start() -> Self {
        if let Some(brokers) = std::env::var("WORKLOAD_TEST_BROKERS")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            let config = broker_config(brokers.split(',').map(|s| s.trim().to_string()).collect());
            let client = connect_with_retry(&config, Duration::from_secs(30)).await;
            return Self {
                redpanda: None,
                client,
                config,
            };
        }

        let redpanda = start_redpanda().await;
        let config = broker_config(vec![format!("127.0.0.1:{}", HOST_KAFKA_PORT)]);
        let client = connect_with_retry(&config, Duration::from_secs(60)).await;

        Self {
            redpanda: Some(redpanda),
            client,
            config,
        }
    }
}

fn broker_config(brokers: Vec<String>) -> BrokerConfig {
    BrokerConfig {
        brokers,
        client_id: "kafka-workload-tests".to_string(),
        ..BrokerConfig::default()
    }
}

/// Start a dev-mode Redpanda advertising a fixed host port.
pub async fn start_redpanda() -> ContainerAsync<GenericImage> {
    let image = GenericImage::new(REDPANDA_IMAGE, REDPANDA_TAG)
        .with_wait_for(WaitFor::seconds(5))
        .with_exposed_port(9092.tcp())
        .with_mapped_port(HOST_KAFKA_PORT, 9092.tcp())
        .with_cmd([
            "redpanda",
            "start",
            "--overprovisioned",
            "--smp",
            "1",
            "--memory",
            "512M",
            "--reserve-memory",
            "0M",
            "--node-id",
            "0",
            "--check=false",
            "--kafka-addr",
            "PLAINTEXT://0.0.0.0:9092",
            "--advertise-kafka-addr",
            "PLAINTEXT://127.0.0.1:19092",
        ]);

    image.start().await.expect("Failed to start Redpanda")
}

/// Retries the connection until the broker answers metadata requests.
async fn connect_with_retry(config: &BrokerConfig, timeout: Duration) -> Arc<rskafka::client::Client> {
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if let Ok(client) = kafka::connect(config).await {
            if kafka::health::check_connection(&client).await {
                return client;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("Broker {:?} not ready after {:?}", config.brokers, timeout);
}
