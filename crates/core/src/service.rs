//! Service definitions: raw settings and the validated `ServiceConfig`.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};
use crate::limits::{MAX_MESSAGE_SIZE_BYTES, MIN_MESSAGE_SIZE_BYTES};
use crate::topic::{derive_topic_names, parse_topic_list, validate_topic_list};

/// Raw per-service settings as loaded from configuration sources.
///
/// Nothing here is trusted; [`ServiceConfig::from_settings`] validates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service index (used in derived topic names)
    #[serde(default)]
    pub index: u32,
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Prefix for derived topic names
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Number of topics to derive when no explicit list is given
    #[serde(default = "default_topic_count")]
    pub topic_count: usize,
    /// Explicit comma-separated topic list (overrides derivation)
    #[serde(default)]
    pub topics: Option<String>,
    /// Partitions per topic
    #[serde(default = "default_partitions_per_topic")]
    pub partitions_per_topic: i32,
    /// Target serialized message size in bytes
    #[serde(default = "default_message_size_bytes")]
    pub message_size_bytes: usize,
}

fn default_service_name() -> String {
    "workload".to_string()
}

fn default_topic_prefix() -> String {
    "loadtest".to_string()
}

fn default_topic_count() -> usize {
    1
}

fn default_partitions_per_topic() -> i32 {
    3
}

fn default_message_size_bytes() -> usize {
    1024
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            index: 0,
            name: default_service_name(),
            topic_prefix: default_topic_prefix(),
            topic_count: default_topic_count(),
            topics: None,
            partitions_per_topic: default_partitions_per_topic(),
            message_size_bytes: default_message_size_bytes(),
        }
    }
}

/// Validated description of one workload stream.
///
/// Immutable once built: the topic set is fixed for the lifetime of the
/// process. Every constructor validates, so holding a `ServiceConfig`
/// means every invariant holds.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct ServiceConfig {
    service_index: u32,
    #[validate(length(min = 1))]
    service_name: String,
    topics: Vec<String>,
    #[validate(range(min = 1))]
    partitions_per_topic: i32,
    #[validate(range(min = MIN_MESSAGE_SIZE_BYTES, max = MAX_MESSAGE_SIZE_BYTES))]
    message_size_bytes: usize,
}

impl ServiceConfig {
    /// Builds and validates a service configuration.
    pub fn new(
        service_index: u32,
        service_name: impl Into<String>,
        topics: Vec<String>,
        partitions_per_topic: i32,
        message_size_bytes: usize,
    ) -> Result<Self> {
        let config = Self {
            service_index,
            service_name: service_name.into(),
            topics,
            partitions_per_topic,
            message_size_bytes,
        };

        config
            .validate()
            .map_err(|e| Error::configuration(format!("service: {}", e)))?;

        if config.service_name.trim().is_empty() {
            return Err(Error::configuration("service name must not be blank"));
        }

        validate_topic_list(&config.topics)?;

        Ok(config)
    }

    /// Builds a configuration from raw settings.
    ///
    /// An explicit `topics` list wins over derivation from
    /// `topic_prefix`/`topic_count`.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        let topics = match settings.topics.as_deref().map(parse_topic_list) {
            Some(list) if !list.is_empty() => list,
            _ => derive_topic_names(&settings.topic_prefix, settings.index, settings.topic_count),
        };

        Self::new(
            settings.index,
            settings.name.clone(),
            topics,
            settings.partitions_per_topic,
            settings.message_size_bytes,
        )
    }

    pub fn service_index(&self) -> u32 {
        self.service_index
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn partitions_per_topic(&self) -> i32 {
        self.partitions_per_topic
    }

    pub fn message_size_bytes(&self) -> usize {
        self.message_size_bytes
    }

    /// Total partitions across all topics of the service.
    pub fn total_partitions(&self) -> usize {
        self.topics.len() * self.partitions_per_topic as usize
    }

    /// Read-only view for observers.
    pub fn view(&self) -> ServiceConfigView {
        ServiceConfigView {
            service_index: self.service_index,
            service_name: self.service_name.clone(),
            topics: self.topics.clone(),
            partitions_per_topic: self.partitions_per_topic,
            message_size_bytes: self.message_size_bytes,
        }
    }
}

/// Serializable snapshot of a [`ServiceConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfigView {
    pub service_index: u32,
    pub service_name: String,
    pub topics: Vec<String>,
    pub partitions_per_topic: i32,
    pub message_size_bytes: usize,
}
