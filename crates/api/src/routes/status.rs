//! Status and statistics endpoints.

use axum::{extract::State, Json};
use kafka::TopicCreationResult;
use telemetry::MetricsSnapshot;

use crate::response::{ApiError, PartitionStatsResponse, StatusResponse};
use crate::state::AppState;

/// GET /status - Producer and consumer status.
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: state.readiness.config(),
        producer: state.status.producer_status(),
        consumer: state.status.consumer_status(),
    })
}

/// GET /status/partitions - Received counts per partition.
pub async fn partitions_handler(State(state): State<AppState>) -> Json<PartitionStatsResponse> {
    Json(PartitionStatsResponse {
        service_name: state.readiness.config().service_name,
        partitions: state.status.partition_stats(),
    })
}

/// GET /stats - Most recently flushed snapshot.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<MetricsSnapshot>, ApiError> {
    state
        .status
        .latest_snapshot()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no statistics flushed yet"))
}

/// GET /status/provisioning - Per-topic provisioning results.
///
/// A failed run is reported with the provisioning error of the first
/// failed topic.
pub async fn provisioning_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<TopicCreationResult>>, ApiError> {
    let report = state
        .status
        .provisioning_report()
        .ok_or_else(|| ApiError::not_found("provisioning has not run"))?;

    Ok(Json(report.into_result()?))
}
