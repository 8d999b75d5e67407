//! OpenAPI documentation configuration.

use axum::Json;
use utoipa::OpenApi;

use crate::dto::{
    CategoryProgressDto, CreateJobBody, CreateJobResponse, EventDto, HealthResponse, JobResponse,
    QueueResponse, RunSummaryResponse, ServiceStatus,
};
use crate::error::ErrorResponse;
use crate::handlers::{batch, health, jobs, queue};

/// OpenAPI documentation for the Scout API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Scout API",
        version = "1.0.0",
        description = "Deduplicated event search jobs.

Scout accepts search requests for a location, a date and a list of event
categories, runs them in bounded batch passes against a search provider,
and caches each category's results so overlapping requests share the work.

## Quick Start

1. Check server health: `GET /api/v1/health`
2. Create a job: `POST /api/v1/jobs`
3. Poll it: `GET /api/v1/jobs/{id}`
"
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health::health_check,
        jobs::create_job,
        jobs::get_job,
        jobs::cancel_job,
        queue::get_queue,
        batch::run_batch,
    ),
    components(
        schemas(
            // Request types
            CreateJobBody,
            // Response types
            HealthResponse,
            ServiceStatus,
            JobResponse,
            CategoryProgressDto,
            EventDto,
            CreateJobResponse,
            QueueResponse,
            RunSummaryResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "System health"),
        (name = "jobs", description = "Search job lifecycle"),
        (name = "batch", description = "Queue and batch runner"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI document as JSON.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
