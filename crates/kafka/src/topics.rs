//! Topic provisioning and verification.

use async_trait::async_trait;
use rskafka::client::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use workload_core::limits::{DEFAULT_REPLICATION_FACTOR, DEFAULT_TOPIC_RETENTION_MS};
use workload_core::{Error, Result};

use crate::config::ProvisioningSettings;

/// Topic configuration for creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    pub retention_ms: i64,
    pub cleanup_policy: &'static str,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            retention_ms: DEFAULT_TOPIC_RETENTION_MS,
            cleanup_policy: "delete",
        }
    }

    pub fn with_replication(mut self, factor: i16) -> Self {
        self.replication_factor = factor;
        self
    }

    pub fn with_retention_ms(mut self, ms: i64) -> Self {
        self.retention_ms = ms;
        self
    }

    /// Topic-level configuration entries.
    pub fn configs(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("cleanup.policy", self.cleanup_policy.to_string()),
            ("retention.ms", self.retention_ms.to_string()),
        ])
    }
}

/// What the broker reports about an existing topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: i32,
}

/// Administrative access to the broker.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn list_topics(&self) -> Result<Vec<String>>;
    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription>;
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

/// [`TopicAdmin`] over an rskafka client.
///
/// The create-topics request carries no topic configs, so `retention.ms`
/// and `cleanup.policy` fall back to broker defaults.
pub struct RskafkaAdmin {
    client: Arc<Client>,
    timeout_ms: i32,
}

impl RskafkaAdmin {
    pub fn new(client: Arc<Client>, timeout_ms: i32) -> Self {
        Self { client, timeout_ms }
    }
}

#[async_trait]
impl TopicAdmin for RskafkaAdmin {
    async fn connect(&self) -> Result<()> {
        // The client is connected when built; this only checks the controller.
        self.client
            .controller_client()
            .map(|_| ())
            .map_err(|e| Error::broker(format!("no controller available: {}", e)))
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let topics = self
            .client
            .list_topics()
            .await
            .map_err(|e| Error::broker(format!("failed to list topics: {}", e)))?;
        Ok(topics.into_iter().map(|t| t.name).collect())
    }

    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription> {
        let topics = self
            .client
            .list_topics()
            .await
            .map_err(|e| Error::broker(format!("failed to describe topic: {}", e)))?;

        topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| TopicDescription {
                name: t.name,
                partitions: t.partitions.len() as i32,
            })
            .ok_or_else(|| Error::broker(format!("topic {} not found", topic)))
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let controller = self
            .client
            .controller_client()
            .map_err(|e| Error::broker(format!("no controller available: {}", e)))?;

        debug!(topic = %spec.name, configs = ?spec.configs(), "Creating topic");

        controller
            .create_topic(
                spec.name.clone(),
                spec.partitions,
                spec.replication_factor,
                self.timeout_ms,
            )
            .await
            .map_err(|e| Error::broker(format!("failed to create topic: {}", e)))
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Outcome of ensuring one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCreationResult {
    pub topic: String,
    pub created: bool,
    pub partitions: i32,
    pub error: Option<String>,
}

impl TopicCreationResult {
    fn created(topic: &str, partitions: i32) -> Self {
        Self {
            topic: topic.to_string(),
            created: true,
            partitions,
            error: None,
        }
    }

    fn verified(topic: &str, partitions: i32) -> Self {
        Self {
            topic: topic.to_string(),
            created: false,
            partitions,
            error: None,
        }
    }

    fn failed(topic: &str, partitions: i32, error: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            created: false,
            partitions,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Results for every configured topic, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningReport {
    /// Whether the broker answered the connect and list calls
    pub broker_reachable: bool,
    pub results: Vec<TopicCreationResult>,
}

impl ProvisioningReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(TopicCreationResult::is_ok)
    }

    pub fn created(&self) -> usize {
        self.results.iter().filter(|r| r.created).count()
    }

    pub fn failures(&self) -> Vec<&TopicCreationResult> {
        self.results.iter().filter(|r| !r.is_ok()).collect()
    }

    /// Turns the first failed topic into a provisioning error.
    pub fn into_result(self) -> Result<Vec<TopicCreationResult>> {
        if let Some(failed) = self.failures().first() {
            return Err(Error::provisioning(
                failed.topic.clone(),
                failed.error.clone().unwrap_or_default(),
            ));
        }
        Ok(self.results)
    }
}

/// Creates missing topics and verifies existing ones.
pub struct TopicProvisioner {
    admin: Arc<dyn TopicAdmin>,
    settings: ProvisioningSettings,
}

impl TopicProvisioner {
    pub fn new(admin: Arc<dyn TopicAdmin>, settings: ProvisioningSettings) -> Self {
        Self { admin, settings }
    }

    fn spec_for(&self, topic: &str, partitions: i32) -> TopicSpec {
        TopicSpec::new(topic, partitions)
            .with_replication(self.settings.replication_factor)
            .with_retention_ms(self.settings.retention_ms)
    }

    /// Ensures every topic exists with `partitions_per_topic` partitions.
    ///
    /// Existing topics are never altered. A topic is created at most once
    /// per call.
    pub async fn ensure(
        &self,
        topics: &[String],
        partitions_per_topic: i32,
    ) -> Vec<TopicCreationResult> {
        self.provision(topics, partitions_per_topic).await.results
    }

    /// [`ensure`](Self::ensure) wrapped in a report.
    pub async fn provision(&self, topics: &[String], partitions_per_topic: i32) -> ProvisioningReport {
        let (broker_reachable, results) = match self.connect_and_list().await {
            Ok(existing) => {
                let mut results = Vec::with_capacity(topics.len());
                for topic in topics {
                    results.push(self.ensure_one(topic, partitions_per_topic, &existing).await);
                }
                (true, results)
            }
            Err(e) => (
                false,
                topics
                    .iter()
                    .map(|t| TopicCreationResult::failed(t, partitions_per_topic, e.to_string()))
                    .collect(),
            ),
        };

        if let Err(e) = self.admin.disconnect().await {
            warn!(error = %e, "Failed to disconnect topic admin");
        }

        for result in &results {
            match &result.error {
                None if result.created => {
                    info!(topic = %result.topic, partitions = result.partitions, "Created topic")
                }
                None => {
                    info!(topic = %result.topic, partitions = result.partitions, "Verified topic")
                }
                Some(err) => error!(
                    topic = %result.topic,
                    partitions = result.partitions,
                    error = %err,
                    "Topic provisioning failed"
                ),
            }
        }

        ProvisioningReport {
            broker_reachable,
            results,
        }
    }

    async fn connect_and_list(&self) -> Result<HashSet<String>> {
        self.admin.connect().await?;
        Ok(self.admin.list_topics().await?.into_iter().collect())
    }

    async fn ensure_one(
        &self,
        topic: &str,
        partitions: i32,
        existing: &HashSet<String>,
    ) -> TopicCreationResult {
        if existing.contains(topic) {
            return match self.admin.describe_topic(topic).await {
                Ok(desc) if desc.partitions == partitions => {
                    TopicCreationResult::verified(topic, desc.partitions)
                }
                Ok(desc) => TopicCreationResult::failed(
                    topic,
                    desc.partitions,
                    format!(
                        "partition count mismatch: expected {}, found {}",
                        partitions, desc.partitions
                    ),
                ),
                Err(e) => TopicCreationResult::failed(topic, partitions, e.to_string()),
            };
        }

        match self.admin.create_topic(&self.spec_for(topic, partitions)).await {
            Ok(()) => TopicCreationResult::created(topic, partitions),
            Err(e) => TopicCreationResult::failed(topic, partitions, e.to_string()),
        }
    }
}
