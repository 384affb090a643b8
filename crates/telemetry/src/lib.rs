//! Telemetry for the workload generator.
//!
//! Interval statistics are aggregated in memory, flushed on a timer, and
//! handed to a pluggable sink as named data points.

pub mod health;
pub mod metrics;
pub mod sink;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use sink::*;
pub use tracing_setup::*;
