//! JSON response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kafka::{ConsumerStatus, ProducerStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use workload_core::ServiceConfigView;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub broker_connected: bool,
    pub topics_provisioned: bool,
    pub producer_running: bool,
    pub consumer_running: bool,
}

/// Producer and consumer status for the service.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: ServiceConfigView,
    pub producer: ProducerStatus,
    pub consumer: ConsumerStatus,
}

/// Received counts per `<topic>-<partition>`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatsResponse {
    pub service_name: String,
    pub partitions: BTreeMap<String, u64>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error type.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<workload_core::Error> for ApiError {
    fn from(err: workload_core::Error) -> Self {
        let status = if err.is_fatal() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError::with_code(status, err.kind().code(), err.to_string())
    }
}
