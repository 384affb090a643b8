//! HTTP health and status layer for the workload generator.
//!
//! Handlers only read: readiness, producer/consumer status and the latest
//! flushed statistics come from capability traits injected into
//! [`AppState`].

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, ReadinessProbe, StatusSource};
