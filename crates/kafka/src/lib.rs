//! Kafka plumbing for the workload generator: connection, topic
//! provisioning, and the multi-topic producer and consumer.

pub mod config;
pub mod connection;
pub mod consumer;
pub mod health;
pub mod message;
pub mod partitioner;
pub mod producer;
pub mod topics;

pub use config::*;
pub use connection::connect;
pub use consumer::*;
pub use message::*;
pub use partitioner::{PartitionSelector, PartitionStrategy, RoundRobin};
pub use producer::*;
pub use topics::*;
