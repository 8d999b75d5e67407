//! Batch trigger endpoint.

use axum::{Json, extract::State};

use scout_core::TracingRunnerReporter;

use crate::dto::RunSummaryResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Run one bounded batch pass and wait for it.
///
/// Returns `started = false` when another runner holds the lock. The pass
/// stops early if the server begins shutting down.
#[utoipa::path(
    post,
    path = "/api/v1/batch/run",
    responses(
        (status = 200, description = "Batch pass finished", body = RunSummaryResponse),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 403, description = "Admin endpoints disabled"),
        (status = 503, description = "Storage unavailable"),
    ),
    security(("bearer" = [])),
    tag = "batch"
)]
pub async fn run_batch(
    State(state): State<AppState>,
) -> Result<Json<RunSummaryResponse>, ApiError> {
    let summary = state
        .job_service
        .run_batch_cancellable(state.shutdown_token.child_token(), &TracingRunnerReporter)
        .await?;
    Ok(Json(RunSummaryResponse::from(summary)))
}
