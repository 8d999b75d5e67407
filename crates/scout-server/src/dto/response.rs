//! Response DTOs for API endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use scout_core::{CreateJobOutcome, EventItem, Job, JobSummary, RunSummary};

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("healthy" or "unhealthy")
    pub status: String,
    /// Server version
    pub version: String,
    /// Storage connectivity status
    pub storage: ServiceStatus,
}

/// Status of an individual service component.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    /// Whether the service is reachable
    pub healthy: bool,
    /// Optional message (e.g., error details)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// Jobs
// =============================================================================

/// Search job response.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    /// Job UUID
    pub job_id: Uuid,
    /// Current job status (PENDING, RUNNING, SUCCESS, PARTIAL_SUCCESS, EMPTY, FAILED, CANCELLED)
    pub status: String,
    /// Location as submitted
    pub location: String,
    /// Event date
    pub date: String,
    /// Number of categories
    pub total_categories: usize,
    /// Categories completed
    pub completed_categories: usize,
    /// Categories failed
    pub failed_categories: usize,
    /// Per-category progress, in request order
    pub categories: Vec<CategoryProgressDto>,
    /// Events found so far
    pub results: Vec<EventDto>,
    /// Job creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Processing start timestamp
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if failed or cancelled
    pub error: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let categories = JobSummary::from(&job)
            .categories
            .into_iter()
            .map(|c| CategoryProgressDto {
                name: c.name,
                state: c.state.as_str().to_string(),
                retry_count: c.retry_count,
                result_count: c.result_count,
                error: c.error,
            })
            .collect();

        Self {
            job_id: job.id,
            status: job.status.as_str().to_string(),
            location: job.location,
            date: job.date,
            total_categories: job.progress.total_categories,
            completed_categories: job.progress.completed_categories,
            failed_categories: job.progress.failed_categories,
            categories,
            results: job.results.into_iter().map(EventDto::from).collect(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job.error,
        }
    }
}

/// Progress of one category.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryProgressDto {
    /// Canonical category label
    pub name: String,
    /// NOT_STARTED, IN_PROGRESS, RETRIED, COMPLETED or FAILED
    pub state: String,
    /// Retries used so far
    pub retry_count: u32,
    /// Items found, once completed
    pub result_count: Option<usize>,
    /// Last error, if failed
    pub error: Option<String>,
}

/// A single event.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventDto {
    pub title: String,
    /// Category the event was found under
    pub category: String,
    pub description: Option<String>,
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub price_info: Option<String>,
    pub is_free: bool,
    pub website_url: Option<String>,
    pub booking_url: Option<String>,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
}

impl From<EventItem> for EventDto {
    fn from(e: EventItem) -> Self {
        Self {
            title: e.title,
            category: e.category,
            description: e.description,
            start_date_time: e.start_date_time,
            end_date_time: e.end_date_time,
            venue_name: e.venue_name,
            venue_address: e.venue_address,
            city: e.city,
            price_info: e.price_info,
            is_free: e.is_free,
            website_url: e.website_url,
            booking_url: e.booking_url,
            image_urls: e.image_urls,
            tags: e.tags,
            source: e.source,
        }
    }
}

/// Response to a create request.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateJobResponse {
    /// The new or existing job
    pub job: JobResponse,
    /// False when an identical live job already existed
    pub is_new: bool,
    /// True when a stale job was replaced
    pub is_stale: bool,
}

impl From<CreateJobOutcome> for CreateJobResponse {
    fn from(outcome: CreateJobOutcome) -> Self {
        Self {
            job: JobResponse::from(outcome.job),
            is_new: outcome.is_new,
            is_stale: outcome.is_stale,
        }
    }
}

// =============================================================================
// Queue & Batch
// =============================================================================

/// Pending queue overview.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueResponse {
    /// Number of queued job ids
    pub pending_jobs: u64,
}

/// Outcome of a batch run.
#[derive(Debug, Serialize, ToSchema)]
pub struct RunSummaryResponse {
    /// False when another run held the lock
    pub started: bool,
    /// Jobs processed in this run
    pub processed_jobs: usize,
    /// Wall-clock duration
    pub duration_ms: u64,
}

impl From<RunSummary> for RunSummaryResponse {
    fn from(s: RunSummary) -> Self {
        Self {
            started: s.started,
            processed_jobs: s.processed_jobs,
            duration_ms: s.duration_ms,
        }
    }
}
