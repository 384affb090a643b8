//! Bounds and fixed parameters for the workload generator.
//!
//! Broker-imposed limits (topic naming, default max message size) and the
//! statistics invariants the aggregator and consumer share.

// === Topic Limits ===

/// Maximum topic name length accepted by Kafka.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// Allowed topic name characters.
pub const TOPIC_NAME_PATTERN: &str = r"^[A-Za-z0-9._-]+$";

// === Message Limits ===

/// Smallest configurable message size in bytes.
pub const MIN_MESSAGE_SIZE_BYTES: usize = 1;

/// Largest configurable message size in bytes (1MB, the broker default
/// `message.max.bytes`).
pub const MAX_MESSAGE_SIZE_BYTES: usize = 1024 * 1024;

// === Latency Limits ===

/// Latency samples at or above this value (ms) are treated as stale or corrupt.
pub const MAX_LATENCY_MS: i64 = 60_000;

/// Maximum latency samples retained per flush window.
pub const LATENCY_WINDOW_CAPACITY: usize = 1000;

// === Provisioning Defaults ===

/// Replication factor used for newly created topics.
pub const DEFAULT_REPLICATION_FACTOR: i16 = 3;

/// Retention for load-test topics (1 hour).
pub const DEFAULT_TOPIC_RETENTION_MS: i64 = 60 * 60 * 1000;

/// Admin request timeout in milliseconds.
pub const DEFAULT_ADMIN_TIMEOUT_MS: i32 = 30_000;
