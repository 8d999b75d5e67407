//! Search job endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::dto::{CreateJobBody, CreateJobResponse, JobResponse};
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Create a search job.
///
/// Requests with the same location, date and categories (after
/// normalization) share one job while it is fresh. A new job is queued for
/// the batch runner and answered with 202; an existing one is returned with
/// 200.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = CreateJobBody,
    responses(
        (status = 202, description = "New job queued", body = CreateJobResponse),
        (status = 200, description = "Identical job already exists", body = CreateJobResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let outcome = state.job_service.create_job(body.into()).await?;

    let status = if outcome.is_new {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(CreateJobResponse::from(outcome))))
}

/// Get a job with its progress and results so far.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Job found", body = JobResponse),
        (status = 404, description = "Job not found or expired", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.job_service.get_job(id).await?;
    Ok(Json(JobResponse::from(job)))
}

/// Cancel a pending or running job.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = JobResponse),
        (status = 400, description = "Job already finished", body = ErrorResponse),
        (status = 404, description = "Job not found or expired", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.job_service.cancel_job(id).await?;
    Ok(Json(JobResponse::from(job)))
}
