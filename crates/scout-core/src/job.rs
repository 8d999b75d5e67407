//! Domain types for category-partitioned search jobs.
//!
//! A [`Job`] is one request for events at a (location, date, category set).
//! Each category is tracked independently through a [`CategoryState`];
//! the job-level [`JobStatus`] is derived from those states by
//! [`crate::progress::derive_final_status`].
//!
//! # Lifecycle
//!
//! ```text
//! PENDING → RUNNING → SUCCESS | PARTIAL_SUCCESS | EMPTY | FAILED
//!    ↓         ↓
//! CANCELLED  CANCELLED
//! ```
//!
//! Per category:
//!
//! ```text
//! NOT_STARTED → IN_PROGRESS → COMPLETED | FAILED
//!                   ↓   ↑
//!                  RETRIED
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Job Status
// =============================================================================

/// Status of a search job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is queued and waiting for a batch runner.
    Pending,
    /// A batch runner is working through the categories.
    Running,
    /// Every category completed and at least one event was found.
    Success,
    /// Some categories completed, some failed.
    PartialSuccess,
    /// Every category completed, but nothing was found.
    Empty,
    /// No category could be completed.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
}

impl JobStatus {
    /// Returns the string representation used in records and APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::PartialSuccess => "PARTIAL_SUCCESS",
            JobStatus::Empty => "EMPTY",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Returns true once no further processing will happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Cancellation is only valid before the job has settled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// Error type for parsing JobStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStatusError(String);

impl std::fmt::Display for ParseJobStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid job status: {}", self.0)
    }
}

impl std::error::Error for ParseJobStatusError {}

impl std::str::FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "PARTIAL_SUCCESS" => Ok(JobStatus::PartialSuccess),
            "EMPTY" => Ok(JobStatus::Empty),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            _ => Err(ParseJobStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Category State
// =============================================================================

/// Lifecycle state of a single category within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryStatus {
    #[default]
    NotStarted,
    InProgress,
    Retried,
    Completed,
    Failed,
}

impl CategoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryStatus::NotStarted => "NOT_STARTED",
            CategoryStatus::InProgress => "IN_PROGRESS",
            CategoryStatus::Retried => "RETRIED",
            CategoryStatus::Completed => "COMPLETED",
            CategoryStatus::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED never change again for the same job.
    pub fn is_settled(&self) -> bool {
        matches!(self, CategoryStatus::Completed | CategoryStatus::Failed)
    }

    /// An attempt is currently outstanding.
    pub fn is_active(&self) -> bool {
        matches!(self, CategoryStatus::InProgress | CategoryStatus::Retried)
    }

    /// Forward-only transition table.
    pub fn can_transition_to(&self, next: CategoryStatus) -> bool {
        use CategoryStatus::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, NotStarted) => false,
            (NotStarted, _) => true,
            (InProgress, Retried | Completed | Failed) => true,
            (Retried, InProgress | Retried | Completed | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-category sub-state of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryState {
    pub state: CategoryStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
}

/// Aggregate progress over all categories of a job.
///
/// `completed_categories` and `failed_categories` are derived data; they are
/// rewritten by [`crate::progress::recompute_counters`] after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total_categories: usize,
    pub completed_categories: usize,
    pub failed_categories: usize,
    pub category_states: BTreeMap<String, CategoryState>,
}

impl Progress {
    /// Fresh progress with every category `NOT_STARTED`.
    pub fn for_categories(categories: &[String]) -> Self {
        let category_states: BTreeMap<String, CategoryState> = categories
            .iter()
            .map(|c| (c.clone(), CategoryState::default()))
            .collect();
        Self {
            total_categories: category_states.len(),
            completed_categories: 0,
            failed_categories: 0,
            category_states,
        }
    }
}

// =============================================================================
// Event Item
// =============================================================================

/// A single event returned by the search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub title: String,
    /// Canonical category this item was found under.
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_info: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EventItem {
    /// Minimal item with only a title and category.
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            description: None,
            start_date_time: None,
            end_date_time: None,
            venue_name: None,
            venue_address: None,
            city: None,
            price_info: None,
            is_free: false,
            website_url: None,
            booking_url: None,
            image_urls: Vec::new(),
            tags: Vec::new(),
            source: None,
        }
    }
}

// =============================================================================
// Job
// =============================================================================

/// A unit of category-partitioned search work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: Uuid,

    /// Dedup fingerprint of (location, date, category set).
    pub signature: String,

    /// Current job status.
    pub status: JobStatus,

    /// Location as submitted (trimmed).
    pub location: String,

    /// Date as submitted, `YYYY-MM-DD`.
    pub date: String,

    /// Canonical categories in request order.
    pub categories: Vec<String>,

    /// Accumulated events across all completed categories.
    #[serde(default)]
    pub results: Vec<EventItem>,

    pub progress: Progress,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Lifetime of the stored record.
    pub ttl_seconds: u64,

    /// Last fatal error, human readable.
    #[serde(default)]
    pub error: Option<String>,

    /// Write counter, bumped by the job store on every save.
    #[serde(default)]
    pub version: u64,
}

impl Job {
    /// Creates a new `PENDING` job with all categories `NOT_STARTED`.
    pub fn new(
        signature: String,
        location: impl Into<String>,
        date: impl Into<String>,
        categories: Vec<String>,
        ttl_seconds: u64,
    ) -> Self {
        let now = Utc::now();
        let progress = Progress::for_categories(&categories);
        Self {
            id: Uuid::new_v4(),
            signature,
            status: JobStatus::Pending,
            location: location.into(),
            date: date.into(),
            categories,
            results: Vec::new(),
            progress,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            ttl_seconds,
            error: None,
            version: 0,
        }
    }

    /// State of one category, if it belongs to this job.
    pub fn category_state(&self, category: &str) -> Option<&CategoryState> {
        self.progress.category_states.get(category)
    }

    /// Categories that still need work, in request order.
    pub fn unsettled_categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|c| {
                self.category_state(c)
                    .is_none_or(|state| !state.state.is_settled())
            })
            .cloned()
            .collect()
    }
}

/// Partial update merged into a stored job by
/// [`crate::job_store::JobStore::update_job`].
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub results: Option<Vec<EventItem>>,
    pub progress: Option<Progress>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_results(mut self, results: Vec<EventItem>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Everything the batch runner owns on a job: status, results, progress
    /// and timestamps.
    pub fn snapshot_of(job: &Job) -> Self {
        Self {
            status: Some(job.status),
            results: Some(job.results.clone()),
            progress: Some(job.progress.clone()),
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job.error.clone(),
        }
    }

    /// Merges the set fields into `job`. Does not touch `updated_at`.
    pub fn apply_to(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(results) = self.results {
            job.results = results;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
    }
}

// =============================================================================
// Job Creation
// =============================================================================

/// Request to create (or find) a search job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub location: String,
    pub date: String,
    pub categories: Vec<String>,
    /// Record lifetime override (uses the store default if None).
    pub ttl_seconds: Option<u64>,
}

impl CreateJobRequest {
    pub fn new(location: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            date: date.into(),
            categories: Vec::new(),
            ttl_seconds: None,
        }
    }

    /// Add a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Add several categories.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.extend(categories.into_iter().map(Into::into));
        self
    }

    /// Set the record lifetime.
    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }
}

/// Result of [`crate::job_store::JobStore::create_job`].
#[derive(Debug, Clone)]
pub struct CreateJobOutcome {
    pub job: Job,
    /// False when an existing, non-stale job with the same signature was returned.
    pub is_new: bool,
    /// True when a stale job with the same signature was replaced.
    pub is_stale: bool,
}

// =============================================================================
// Tests
// =============================================================================
