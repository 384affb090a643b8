//! Orchestration of one workload service.
//!
//! Startup provisions the service's topics, then starts the statistics
//! aggregator, the consumer and the producer. Shutdown runs in reverse and
//! ends with a final statistics flush.

pub mod service;

pub use service::*;
