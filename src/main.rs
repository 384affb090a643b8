//! Kafka workload generator
//!
//! Provisions a service's topics, then continuously produces size-exact
//! synthetic messages round-robin across them while consuming them back to
//! measure throughput and end-to-end latency.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use kafka::{
    BrokerConfig, ConsumerSettings, KafkaRecordSink, KafkaRecordSource, ProducerSettings,
    ProvisioningSettings, RskafkaAdmin,
};
use telemetry::{init_tracing_from_env, LogSink};
use worker::{WorkloadDeps, WorkloadService, WorkloadSettings};
use workload_core::{ServiceConfig, ServiceSettings};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AppConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Deployment environment reported with every metric
    #[serde(default = "default_environment")]
    environment: String,

    /// Statistics flush interval
    #[serde(default = "default_flush_interval_ms")]
    flush_interval_ms: u64,

    /// Upper bound on graceful shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,

    #[serde(default)]
    broker: BrokerConfig,

    #[serde(default)]
    service: ServiceSettings,

    #[serde(default)]
    provisioning: ProvisioningSettings,

    #[serde(default)]
    producer: ProducerSettings,

    #[serde(default)]
    consumer: ConsumerSettings,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            flush_interval_ms: default_flush_interval_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            broker: BrokerConfig::default(),
            service: ServiceSettings::default(),
            provisioning: ProvisioningSettings::default(),
            producer: ProducerSettings::default(),
            consumer: ConsumerSettings::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env().context("Failed to initialize tracing")?;

    info!("Starting Kafka workload generator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let service_config =
        ServiceConfig::from_settings(&config.service).context("Invalid service configuration")?;

    info!(
        brokers = ?config.broker.brokers,
        sasl_username = config.broker.sasl_username.as_deref().unwrap_or("none"),
        service = %service_config.service_name(),
        topics = ?service_config.topics(),
        "Loaded configuration"
    );

    let client = kafka::connect(&config.broker)
        .await
        .context("Failed to connect to Kafka")?;

    if kafka::health::check_connection(&client).await {
        info!("Kafka connection: healthy");
    } else {
        warn!("Kafka connection: topic listing failed, provisioning will report details");
    }

    let deps = WorkloadDeps {
        admin: Arc::new(RskafkaAdmin::new(
            client.clone(),
            config.provisioning.admin_timeout_ms,
        )),
        sink: Arc::new(KafkaRecordSink::new(client.clone())),
        source: Arc::new(KafkaRecordSource::new(
            client.clone(),
            config.consumer.fetch_max_bytes,
        )),
        metrics_sink: Arc::new(LogSink),
    };

    let settings = WorkloadSettings {
        environment: config.environment.clone(),
        flush_interval: Duration::from_millis(config.flush_interval_ms),
        provisioning: config.provisioning.clone(),
        producer: config.producer.clone(),
        consumer: config.consumer.clone(),
    };

    let service = Arc::new(WorkloadService::new(service_config, deps, settings));
    service
        .start()
        .await
        .context("Failed to start workload service")?;

    let app = router(AppState::from_service(service.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if let Err(e) = service.stop_with_timeout(timeout).await {
        error!("Workload did not stop cleanly: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}", name)),
        Err(_) => Ok(None),
    }
}

/// Load configuration from files and environment.
fn load_config() -> Result<AppConfig> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&AppConfig::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("WORKLOAD")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat variables for the settings operators change most often
    if let Ok(brokers) = std::env::var("WORKLOAD_BROKERS") {
        config.broker.brokers = brokers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(username) = std::env::var("WORKLOAD_SASL_USERNAME") {
        config.broker.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("WORKLOAD_SASL_PASSWORD") {
        config.broker.sasl_password = Some(password);
    }
    if let Some(index) = env_parse("WORKLOAD_SERVICE_INDEX")? {
        config.service.index = index;
    }
    if let Ok(name) = std::env::var("WORKLOAD_SERVICE_NAME") {
        config.service.name = name;
    }
    if let Ok(topics) = std::env::var("WORKLOAD_TOPICS") {
        config.service.topics = Some(topics);
    }
    if let Some(count) = env_parse("WORKLOAD_TOPIC_COUNT")? {
        config.service.topic_count = count;
    }
    if let Some(partitions) = env_parse("WORKLOAD_PARTITIONS_PER_TOPIC")? {
        config.service.partitions_per_topic = partitions;
    }
    if let Some(size) = env_parse("WORKLOAD_MESSAGE_SIZE_BYTES")? {
        config.service.message_size_bytes = size;
    }
    if let Ok(environment) = std::env::var("WORKLOAD_ENVIRONMENT") {
        config.environment = environment;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
