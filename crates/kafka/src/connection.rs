//! Building the shared broker client.

use crate::config::{BrokerConfig, SaslMechanism};
use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use std::sync::Arc;
use tracing::info;
use workload_core::{Error, Result};

/// Creates a TLS configuration trusting the webpki roots.
pub fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

fn sasl_config(mechanism: SaslMechanism, username: &str, password: &str) -> SaslConfig {
    let credentials = Credentials::new(username.to_string(), password.to_string());
    match mechanism {
        SaslMechanism::Plain => SaslConfig::Plain(credentials),
        SaslMechanism::ScramSha256 => SaslConfig::ScramSha256(credentials),
        SaslMechanism::ScramSha512 => SaslConfig::ScramSha512(credentials),
    }
}

/// Connects to the bootstrap brokers.
///
/// The returned client is shared by the provisioner, producer and consumer.
pub async fn connect(config: &BrokerConfig) -> Result<Arc<Client>> {
    if config.brokers.is_empty() {
        return Err(Error::configuration("at least one broker address is required"));
    }

    let mut builder = ClientBuilder::new(config.brokers.clone()).client_id(config.client_id.clone());

    if config.uses_tls() {
        builder = builder.tls_config(create_tls_config());
    }

    if let Some((username, password)) = config.credentials() {
        builder = builder.sasl_config(sasl_config(config.sasl_mechanism, username, password));
    }

    let client = tokio::time::timeout(config.request_timeout(), builder.build())
        .await
        .map_err(|_| {
            Error::broker(format!(
                "timed out connecting to {} after {}ms",
                config.broker_string(),
                config.request_timeout_ms
            ))
        })?
        .map_err(|e| Error::broker(format!("failed to connect to {}: {}", config.broker_string(), e)))?;

    info!(
        brokers = %config.broker_string(),
        tls = config.uses_tls(),
        sasl = config.credentials().is_some(),
        "Connected to Kafka"
    );

    Ok(Arc::new(client))
}
