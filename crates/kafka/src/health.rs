//! Broker health checks.

use rskafka::client::Client;
use std::collections::HashSet;
use tracing::{debug, error};

/// Check broker connection health by listing topics.
pub async fn check_connection(client: &Client) -> bool {
    match client.list_topics().await {
        Ok(topics) => {
            debug!(topics = topics.len(), "Kafka connection healthy");
            true
        }
        Err(e) => {
            error!("Failed to list Kafka topics: {}", e);
            false
        }
    }
}

/// Returns the configured topics the broker does not know about.
pub async fn missing_topics(client: &Client, topics: &[String]) -> Vec<String> {
    match client.list_topics().await {
        Ok(existing) => {
            let existing: HashSet<_> = existing.iter().map(|t| t.name.as_str()).collect();
            topics
                .iter()
                .filter(|t| !existing.contains(t.as_str()))
                .cloned()
                .collect()
        }
        Err(_) => topics.to_vec(),
    }
}
