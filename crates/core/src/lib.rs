//! Core types, validation, and errors for the Kafka workload generator.

pub mod error;
pub mod limits;
pub mod service;
pub mod topic;

pub use error::{Error, ErrorKind, Result};
pub use service::*;
pub use topic::*;
