//! Size-exact synthetic payloads.
//!
//! A payload is the compact JSON serialization of [`WorkloadMessage`]. When
//! the base record is smaller than the target, a trailing `padding` field of
//! ASCII `x` characters brings the serialized size to the target exactly.
//! The filler needs no JSON escaping, so its character count is its byte
//! count.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;
use workload_core::{Result, ServiceConfig};

/// Byte length of `,"padding":""`, the cost of the padding field with an
/// empty value.
pub const PADDING_OVERHEAD: usize = 13;

const PADDING_CHAR: char = 'x';
const ID_SUFFIX_LEN: usize = 9;

/// Record sent on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadMessage {
    pub id: String,
    /// Send time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub service_index: u32,
    pub service_name: String,
    pub topic: String,
    pub sequence: u64,
    /// Nominal target size in bytes
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,
}

/// Whether the payload hit its target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCheck {
    Exact,
    /// The target is below what the schema needs; the base record was sent
    /// without padding.
    Exceeded { base_size: usize, target: usize },
}

impl SizeCheck {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }
}

/// A serialized payload ready to send.
#[derive(Debug, Clone)]
pub struct SynthesizedMessage {
    pub id: String,
    pub timestamp_ms: i64,
    pub payload: Vec<u8>,
    pub size_check: SizeCheck,
}

impl SynthesizedMessage {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Builds payloads for one service.
#[derive(Debug)]
pub struct MessageSynthesizer {
    service_index: u32,
    service_name: String,
    target_size: usize,
    warned: AtomicBool,
}

impl MessageSynthesizer {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            service_index: config.service_index(),
            service_name: config.service_name().to_string(),
            target_size: config.message_size_bytes(),
            warned: AtomicBool::new(false),
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    fn message_id(&self, now_ms: i64) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", self.service_name, now_ms, &suffix[..ID_SUFFIX_LEN])
    }

    /// Synthesizes the payload for `topic` at `now_ms`.
    pub fn synthesize(&self, topic: &str, sequence: u64, now_ms: i64) -> Result<SynthesizedMessage> {
        let mut message = WorkloadMessage {
            id: self.message_id(now_ms),
            timestamp: now_ms,
            service_index: self.service_index,
            service_name: self.service_name.clone(),
            topic: topic.to_string(),
            sequence,
            size: self.target_size,
            padding: None,
        };

        let base = serde_json::to_vec(&message)?;
        let base_size = base.len();

        if base_size + PADDING_OVERHEAD > self.target_size {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!(
                    service = %self.service_name,
                    topic = %topic,
                    base_size = base_size,
                    target = self.target_size,
                    minimum = base_size + PADDING_OVERHEAD,
                    "Target message size is below the schema minimum; sending unpadded records"
                );
            }
            return Ok(SynthesizedMessage {
                id: message.id,
                timestamp_ms: now_ms,
                payload: base,
                size_check: SizeCheck::Exceeded {
                    base_size,
                    target: self.target_size,
                },
            });
        }

        let padding_len = self.target_size - base_size - PADDING_OVERHEAD;
        message.padding = Some(std::iter::repeat(PADDING_CHAR).take(padding_len).collect());
        let payload = serde_json::to_vec(&message)?;

        Ok(SynthesizedMessage {
            id: message.id,
            timestamp_ms: now_ms,
            payload,
            size_check: SizeCheck::Exact,
        })
    }

    /// Smallest target that can be padded exactly for `topic`.
    ///
    /// Sequence and timestamp widths vary, so this is the minimum for a
    /// current timestamp and a single-digit sequence.
    pub fn minimum_size(&self, topic: &str) -> Result<usize> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let probe = WorkloadMessage {
            id: self.message_id(now_ms),
            timestamp: now_ms,
            service_index: self.service_index,
            service_name: self.service_name.clone(),
            topic: topic.to_string(),
            sequence: 0,
            size: 0,
            padding: None,
        };
        // The `size` field carries the target itself, so its width counts.
        let fixed = serde_json::to_vec(&probe)?.len() - 1 + PADDING_OVERHEAD;
        let mut minimum = fixed + 1;
        while fixed + decimal_width(minimum) > minimum {
            minimum += 1;
        }
        Ok(minimum)
    }
}

fn decimal_width(n: usize) -> usize {
    n.to_string().len()
}
