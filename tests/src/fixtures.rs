//! Test fixtures: service configurations and settings tuned for fast runs.

use chrono::Utc;
use kafka::{ConsumerSettings, ProducerSettings, ProvisioningSettings};
use std::time::Duration;
use worker::WorkloadSettings;
use workload_core::ServiceConfig;

/// Owned topic names from string literals.
pub fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A validated service configuration.
pub fn service_config(names: &[&str], partitions: i32, size: usize) -> ServiceConfig {
    ServiceConfig::new(0, "loadtest", topics(names), partitions, size)
        .expect("fixture config must be valid")
}

/// The two-topic service used across scenarios.
pub fn two_topic_config() -> ServiceConfig {
    service_config(&["t0", "t1"], 3, 1024)
}

/// Settings with short waits so loops react quickly in tests.
pub fn fast_settings() -> WorkloadSettings {
    WorkloadSettings {
        environment: "test".to_string(),
        flush_interval: Duration::from_secs(3600),
        provisioning: ProvisioningSettings::default(),
        producer: ProducerSettings {
            send_backoff_ms: 10,
            ..ProducerSettings::default()
        },
        consumer: ConsumerSettings {
            max_wait_ms: 20,
            fetch_backoff_ms: 10,
            ..ConsumerSettings::default()
        },
    }
}

/// A workload payload with the given origin timestamp.
pub fn payload_with_timestamp(timestamp_ms: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": format!("fixture-{}", timestamp_ms),
        "timestamp": timestamp_ms,
        "serviceIndex": 0,
        "serviceName": "fixture",
        "topic": "t0",
        "sequence": 0,
        "size": 0
    }))
    .expect("fixture payload serializes")
}

/// A payload stamped `age_ms` milliseconds in the past.
pub fn payload_aged(age_ms: i64) -> Vec<u8> {
    payload_with_timestamp(Utc::now().timestamp_millis() - age_ms)
}
