//! Caller-facing job service.
//!
//! [`JobService`] wires the job store, category cache, processor and batch
//! runner together over one [`KvStore`] and exposes the operations the REST
//! API and CLI need: create, get, cancel, run a batch, queue length.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::cache::CategoryCache;
use crate::config::ScoutConfig;
use crate::error::AppError;
use crate::job::{CategoryStatus, CreateJobOutcome, CreateJobRequest, Job, JobStatus, JobUpdate};
use crate::job_store::JobStore;
use crate::processor::CategoryProcessor;
use crate::runner::{BatchRunner, RunSummary, RunnerReporter};
use crate::traits::{CategoryNormalizer, KvStore, SearchProvider};

/// Longest accepted location, in characters.
pub const MAX_LOCATION_LEN: usize = 200;

/// Most categories accepted in one request.
pub const MAX_CATEGORIES: usize = 20;

/// Longest accepted per-request job TTL: 30 days.
pub const MAX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Error stored on jobs cancelled through [`JobService::cancel_job`].
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

/// Compact per-category view for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub state: CategoryStatus,
    pub retry_count: u32,
    pub result_count: Option<usize>,
    pub error: Option<String>,
}

/// Compact job view for callers polling for status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub location: String,
    pub date: String,
    pub total_categories: usize,
    pub completed_categories: usize,
    pub failed_categories: usize,
    pub categories: Vec<CategorySummary>,
    pub result_count: usize,
    pub error: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        let categories = job
            .categories
            .iter()
            .map(|name| {
                let state = job.category_state(name).cloned().unwrap_or_default();
                CategorySummary {
                    name: name.clone(),
                    state: state.state,
                    retry_count: state.retry_count,
                    result_count: state.result_count,
                    error: state.error,
                }
            })
            .collect();

        Self {
            id: job.id,
            status: job.status,
            location: job.location.clone(),
            date: job.date.clone(),
            total_categories: job.progress.total_categories,
            completed_categories: job.progress.completed_categories,
            failed_categories: job.progress.failed_categories,
            categories,
            result_count: job.results.len(),
            error: job.error.clone(),
        }
    }
}

/// Entry point for callers.
#[derive(Debug, Clone)]
pub struct JobService<S: KvStore, P: SearchProvider, N: CategoryNormalizer> {
    jobs: JobStore<S>,
    cache: CategoryCache<S>,
    runner: BatchRunner<S, P>,
    normalizer: N,
}

impl<S, P, N> JobService<S, P, N>
where
    S: KvStore,
    P: SearchProvider,
    N: CategoryNormalizer,
{
    /// Builds every component over a shared store.
    pub fn new(store: S, provider: P, normalizer: N, config: ScoutConfig) -> Self {
        let jobs = JobStore::new(store.clone(), config.job_store);
        let cache = CategoryCache::new(store, config.cache);
        let processor =
            CategoryProcessor::new(provider, jobs.clone(), cache.clone(), config.processor);
        let runner = BatchRunner::new(jobs.clone(), cache.clone(), processor, config.runner);
        Self {
            jobs,
            cache,
            runner,
            normalizer,
        }
    }

    pub fn jobs(&self) -> &JobStore<S> {
        &self.jobs
    }

    pub fn cache(&self) -> &CategoryCache<S> {
        &self.cache
    }

    pub fn runner(&self) -> &BatchRunner<S, P> {
        &self.runner
    }

    /// Validates, normalizes and creates (or finds) a job.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<CreateJobOutcome, AppError> {
        let request = self.prepare(request)?;
        self.jobs.create_job(request).await
    }

    /// Fetches a job.
    ///
    /// # Errors
    ///
    /// [`AppError::JobNotFound`] if the job never existed or has expired.
    pub async fn get_job(&self, id: Uuid) -> Result<Job, AppError> {
        self.jobs
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    /// Cancels a PENDING or RUNNING job.
    ///
    /// A running pass notices the cancellation before its next category.
    pub async fn cancel_job(&self, id: Uuid) -> Result<Job, AppError> {
        let job = self.get_job(id).await?;
        if !job.status.is_cancellable() {
            return Err(AppError::ValidationError(format!(
                "job {} is {} and can no longer be cancelled",
                id, job.status
            )));
        }

        let job = self
            .jobs
            .update_job(
                id,
                JobUpdate::new()
                    .with_status(JobStatus::Cancelled)
                    .with_completed_at(Utc::now())
                    .with_error(CANCELLED_BY_USER),
            )
            .await?;
        info!(job_id = %id, "Job cancelled");
        Ok(job)
    }

    /// Runs one bounded batch pass.
    pub async fn run_batch(&self) -> Result<RunSummary, AppError> {
        self.runner.run_once().await
    }

    /// Runs one bounded batch pass that stops early when `cancel` fires.
    pub async fn run_batch_cancellable<R: RunnerReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        self.runner.run_once_cancellable(cancel, reporter).await
    }

    pub async fn queue_length(&self) -> Result<u64, AppError> {
        self.jobs.queue_length().await
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.jobs.kv().health_check().await
    }

    fn prepare(&self, request: CreateJobRequest) -> Result<CreateJobRequest, AppError> {
        validate_request(&request)?;

        let mut categories: Vec<String> = Vec::with_capacity(request.categories.len());
        for raw in &request.categories {
            let canonical = self.normalizer.normalize(raw);
            if canonical.is_empty() {
                return Err(AppError::ValidationError(
                    "categories must not be blank".to_string(),
                ));
            }
            if !categories.contains(&canonical) {
                categories.push(canonical);
            }
        }

        Ok(CreateJobRequest {
            location: request.location.trim().to_string(),
            date: request.date.trim().to_string(),
            categories,
            ttl_seconds: request.ttl_seconds,
        })
    }
}

/// Checks request parameters before anything is normalized or stored.
pub fn validate_request(request: &CreateJobRequest) -> Result<(), AppError> {
    let location = request.location.trim();
    if location.is_empty() {
        return Err(AppError::ValidationError(
            "location must not be empty".to_string(),
        ));
    }
    if location.chars().count() > MAX_LOCATION_LEN {
        return Err(AppError::ValidationError(format!(
            "location must be at most {MAX_LOCATION_LEN} characters"
        )));
    }

    let date = request.date.trim();
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err(AppError::ValidationError(format!(
            "date '{date}' is not a valid YYYY-MM-DD date"
        )));
    }

    if request.categories.is_empty() {
        return Err(AppError::ValidationError(
            "at least one category is required".to_string(),
        ));
    }
    if request.categories.len() > MAX_CATEGORIES {
        return Err(AppError::ValidationError(format!(
            "at most {MAX_CATEGORIES} categories are allowed"
        )));
    }
    match request.ttl_seconds {
        Some(0) => {
            return Err(AppError::ValidationError(
                "ttl_seconds must be positive".to_string(),
            ))
        }
        Some(ttl) if ttl > MAX_TTL_SECONDS => {
            return Err(AppError::ValidationError(format!(
                "ttl_seconds must be at most {MAX_TTL_SECONDS}"
            )))
        }
        _ => {}
    }

    Ok(())
}
