//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::response::HealthResponse;
use crate::state::AppState;

fn component(report: &telemetry::HealthReport, name: &str) -> bool {
    report
        .components
        .iter()
        .any(|c| c.name == name && c.healthy)
}

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.status.health();

    Json(HealthResponse {
        status: report.status.as_str().to_string(),
        broker_connected: component(&report, "broker"),
        topics_provisioned: component(&report, "topics"),
        producer_running: component(&report, "producer"),
        consumer_running: component(&report, "consumer"),
    })
}

/// GET /health/ready - Readiness probe (provisioned and producing).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (process is serving).
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}
