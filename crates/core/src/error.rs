//! Unified error types for the workload generator.
//!
//! Error kinds:
//! - CONFIG: invalid service configuration (fatal at startup)
//! - PROVISION: topic creation/verification failure (fatal for the service)
//! - SEND: transient produce failure (retried inside the production loop)
//! - RECORD: malformed consumed record (skipped)
//! - LIFECYCLE: stop/disconnect failure (logged)
//! - BROKER: client connection or protocol failure
//! - SERIALIZE: payload encoding failure

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Provisioning,
    TransientSend,
    MalformedRecord,
    Lifecycle,
    Broker,
    Serialization,
}

impl ErrorKind {
    /// Get the error kind code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIG",
            Self::Provisioning => "PROVISION",
            Self::TransientSend => "SEND",
            Self::MalformedRecord => "RECORD",
            Self::Lifecycle => "LIFECYCLE",
            Self::Broker => "BROKER",
            Self::Serialization => "SERIALIZE",
        }
    }
}

/// Unified error type for the workload generator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provisioning failed for topic {topic}: {message}")]
    Provisioning { topic: String, message: String },

    #[error("send failed: {0}")]
    TransientSend(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn provisioning(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provisioning {
            topic: topic.into(),
            message: msg.into(),
        }
    }

    pub fn send(msg: impl Into<String>) -> Self {
        Self::TransientSend(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Provisioning { .. } => ErrorKind::Provisioning,
            Self::TransientSend(_) => ErrorKind::TransientSend,
            Self::MalformedRecord(_) => ErrorKind::MalformedRecord,
            Self::Lifecycle(_) => ErrorKind::Lifecycle,
            Self::Broker(_) => ErrorKind::Broker,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether this error must stop startup of the owning service.
    ///
    /// Steady-state errors (send failures, bad records, shutdown hiccups)
    /// are recovered where they occur and never reach the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::Provisioning | ErrorKind::Broker
        )
    }
}
