//! Queue inspection endpoint.

use axum::{Json, extract::State};

use crate::dto::QueueResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Number of jobs waiting for the batch runner.
#[utoipa::path(
    get,
    path = "/api/v1/queue",
    responses(
        (status = 200, description = "Queue length", body = QueueResponse),
        (status = 503, description = "Storage unavailable"),
    ),
    tag = "batch"
)]
pub async fn get_queue(State(state): State<AppState>) -> Result<Json<QueueResponse>, ApiError> {
    let pending_jobs = state.job_service.queue_length().await?;
    Ok(Json(QueueResponse { pending_jobs }))
}
