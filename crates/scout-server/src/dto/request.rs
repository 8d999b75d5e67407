//! Request DTOs for API endpoints.

use serde::Deserialize;
use utoipa::ToSchema;

use scout_core::CreateJobRequest;

/// Request body for creating a search job.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJobBody {
    /// Free-text location (max: 200 characters)
    #[schema(example = "Berlin")]
    pub location: String,

    /// Event date, `YYYY-MM-DD`
    #[schema(example = "2024-01-15")]
    pub date: String,

    /// Categories to search (1 to 20); aliases are normalized
    #[schema(example = json!(["Live Music", "Clubs & Nachtleben"]))]
    pub categories: Vec<String>,

    /// Job record lifetime in seconds, at most 30 days (default: server configuration)
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl From<CreateJobBody> for CreateJobRequest {
    fn from(body: CreateJobBody) -> Self {
        Self {
            location: body.location,
            date: body.date,
            categories: body.categories,
            ttl_seconds: body.ttl_seconds,
        }
    }
}
