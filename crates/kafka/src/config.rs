//! Broker connection, producer and consumer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use workload_core::limits::{
    DEFAULT_ADMIN_TIMEOUT_MS, DEFAULT_REPLICATION_FACTOR, DEFAULT_TOPIC_RETENTION_MS,
};

use crate::partitioner::PartitionStrategy;

/// SASL mechanism used when credentials are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaslMechanism {
    Plain,
    #[serde(rename = "scram-sha-256")]
    ScramSha256,
    #[default]
    #[serde(rename = "scram-sha-512")]
    ScramSha512,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Bootstrap broker addresses
    pub brokers: Vec<String>,
    /// Client id reported to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Use TLS even without SASL credentials
    #[serde(default)]
    pub tls: bool,
    /// SASL mechanism (plain, scram-sha-256, scram-sha-512)
    #[serde(default)]
    pub sasl_mechanism: SaslMechanism,
    /// SASL username (managed clusters)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (managed clusters)
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Connect and admin request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_client_id() -> String {
    "kafka-workload".to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_ADMIN_TIMEOUT_MS as u64
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: default_client_id(),
            tls: false,
            sasl_mechanism: SaslMechanism::default(),
            sasl_username: None,
            sasl_password: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Username and password, when both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.sasl_username.as_deref(), self.sasl_password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    /// TLS is on when requested explicitly or when SASL credentials are present.
    pub fn uses_tls(&self) -> bool {
        self.tls || self.credentials().is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Settings applied to newly created topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: i32,
}

fn default_replication_factor() -> i16 {
    DEFAULT_REPLICATION_FACTOR
}

fn default_retention_ms() -> i64 {
    DEFAULT_TOPIC_RETENTION_MS
}

fn default_admin_timeout_ms() -> i32 {
    DEFAULT_ADMIN_TIMEOUT_MS
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            replication_factor: default_replication_factor(),
            retention_ms: default_retention_ms(),
            admin_timeout_ms: default_admin_timeout_ms(),
        }
    }
}

/// Production loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSettings {
    /// Pause after a failed send before the next attempt
    #[serde(default = "default_backoff_ms")]
    pub send_backoff_ms: u64,
    /// How a partition is chosen within the selected topic
    #[serde(default)]
    pub partition_strategy: PartitionStrategy,
}

fn default_backoff_ms() -> u64 {
    100
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            send_backoff_ms: default_backoff_ms(),
            partition_strategy: PartitionStrategy::default(),
        }
    }
}

impl ProducerSettings {
    pub fn send_backoff(&self) -> Duration {
        Duration::from_millis(self.send_backoff_ms)
    }
}

/// Consumption loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Maximum time a fetch waits for records
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    /// Upper bound on bytes returned by one fetch
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
    /// Pause after a failed fetch
    #[serde(default = "default_backoff_ms")]
    pub fetch_backoff_ms: u64,
}

fn default_max_wait_ms() -> i32 {
    500
}

fn default_fetch_max_bytes() -> i32 {
    4 * 1024 * 1024
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            fetch_max_bytes: default_fetch_max_bytes(),
            fetch_backoff_ms: default_backoff_ms(),
        }
    }
}

impl ConsumerSettings {
    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }
}
