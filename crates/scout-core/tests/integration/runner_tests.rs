//! Integration tests for the batch runner: final status derivation, global
//! lock, bounds, cache reuse and cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use scout_core::runner::RUNNER_LOCK_KEY;
use scout_core::traits::{KvStore, SearchProvider, SearchQuery};
use scout_core::{
    AppError, CategoryStatus, CreateJobRequest, EventItem, IdentityNormalizer, JobService,
    JobStatus, JobStore, JobStoreConfig, JobUpdate, MemoryStore, RunnerConfig, ServiceErrorKind,
    SilentRunnerReporter,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::integration::common::{
    FaultyStore, MockSearchProvider, fast_config, items_for, memory_service, service_with,
};

fn berlin_request() -> CreateJobRequest {
    CreateJobRequest::new("Berlin", "2024-01-15").with_categories(["Music", "Theater"])
}

#[tokio::test]
async fn test_all_categories_empty_is_empty_not_failed() {
    // Arrange
    let (_, service) = memory_service(MockSearchProvider::new());
    let job = service.create_job(berlin_request()).await.unwrap().job;

    // Act
    let summary = service.run_batch().await.unwrap();

    // Assert
    assert!(summary.started);
    assert_eq!(summary.processed_jobs, 1);
    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Empty);
    assert_eq!(job.progress.completed_categories, 2);
    assert!(job.results.is_empty());
    assert!(job.completed_at.is_some());
    assert!(job.started_at.is_some());
}

#[tokio::test]
async fn test_one_failing_category_is_partial_success() {
    // Arrange
    let provider = MockSearchProvider::new()
        .with_items("Music", 3)
        .always_failing("Theater", ServiceErrorKind::Unavailable);
    let (_, service) = memory_service(provider.clone());
    let job = service.create_job(berlin_request()).await.unwrap().job;

    // Act
    service.run_batch().await.unwrap();

    // Assert
    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::PartialSuccess);
    assert_eq!(job.results.len(), 3);
    assert!(job.results.iter().all(|item| item.category == "Music"));
    assert_eq!(job.progress.completed_categories, 1);
    assert_eq!(job.progress.failed_categories, 1);

    let theater = job.category_state("Theater").unwrap();
    assert_eq!(theater.state, CategoryStatus::Failed);
    assert_eq!(theater.retry_count, 2);
    assert!(theater.error.is_some());
    assert_eq!(provider.calls("Theater"), 3);
}

#[tokio::test]
async fn test_all_categories_failing_is_failed_with_message() {
    let provider = MockSearchProvider::new()
        .always_failing("Music", ServiceErrorKind::Timeout)
        .always_failing("Theater", ServiceErrorKind::MalformedResponse);
    let (_, service) = memory_service(provider);
    let job = service.create_job(berlin_request()).await.unwrap().job;

    service.run_batch().await.unwrap();

    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress.failed_categories, 2);
    let error = job.error.expect("failed job carries an error");
    assert!(error.starts_with("2 of 2 categories failed"));
}

#[tokio::test]
async fn test_success_with_results() {
    let provider = MockSearchProvider::new()
        .with_items("Music", 2)
        .with_items("Theater", 1);
    let (_, service) = memory_service(provider);
    let job = service.create_job(berlin_request()).await.unwrap().job;

    service.run_batch().await.unwrap();

    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.results.len(), 3);
}

#[tokio::test]
async fn test_held_runner_lock_means_not_started() {
    // Arrange
    let (store, service) = memory_service(MockSearchProvider::new());
    service.create_job(berlin_request()).await.unwrap();
    store
        .set(RUNNER_LOCK_KEY, json!({"holder": "other"}), None)
        .await
        .unwrap();

    // Act
    let summary = service.run_batch().await.unwrap();

    // Assert
    assert!(!summary.started);
    assert_eq!(summary.processed_jobs, 0);
    assert_eq!(service.queue_length().await.unwrap(), 1);
}

#[tokio::test]
async fn test_runner_lock_released_after_pass() {
    let (store, service) = memory_service(MockSearchProvider::new());
    service.create_job(berlin_request()).await.unwrap();

    service.run_batch().await.unwrap();

    assert!(store.get(RUNNER_LOCK_KEY).await.unwrap().is_none());
    let second = service.run_batch().await.unwrap();
    assert!(second.started);
    assert_eq!(second.processed_jobs, 0);
}

#[tokio::test]
async fn test_max_jobs_per_run_bounds_the_pass() {
    let store = MemoryStore::new();
    let mut config = fast_config();
    config.runner = config.runner.with_max_jobs_per_run(2);
    let service = service_with(store, MockSearchProvider::new(), config);
    for city in ["Berlin", "Vienna", "Zurich"] {
        service
            .create_job(CreateJobRequest::new(city, "2024-01-15").with_category("Music"))
            .await
            .unwrap();
    }

    let summary = service.run_batch().await.unwrap();

    assert_eq!(summary.processed_jobs, 2);
    assert_eq!(service.queue_length().await.unwrap(), 1);
}

#[tokio::test]
async fn test_cached_categories_skip_the_provider() {
    // Arrange
    let provider = MockSearchProvider::new()
        .always_failing("Music", ServiceErrorKind::Unavailable)
        .with_items("Theater", 1);
    let (_, service) = memory_service(provider.clone());
    service
        .cache()
        .store("berlin", "2024-01-15", "Music", &items_for("Music", 4), None)
        .await
        .unwrap();
    let job = service.create_job(berlin_request()).await.unwrap().job;

    // Act
    service.run_batch().await.unwrap();

    // Assert
    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(provider.calls("Music"), 0);
    assert_eq!(provider.calls("Theater"), 1);
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.results.len(), 5);
    assert_eq!(job.category_state("Music").unwrap().result_count, Some(4));
}

#[tokio::test]
async fn test_second_job_reuses_results_cached_by_first() {
    let provider = MockSearchProvider::new().with_items("Music", 2);
    let (_, service) = memory_service(provider.clone());
    service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap();
    service
        .create_job(
            CreateJobRequest::new("Berlin", "2024-01-15").with_categories(["Music", "Theater"]),
        )
        .await
        .unwrap();

    let summary = service.run_batch().await.unwrap();

    assert_eq!(summary.processed_jobs, 2);
    assert_eq!(provider.calls("Music"), 1);
}

#[tokio::test]
async fn test_cancelled_job_in_queue_is_skipped() {
    let provider = MockSearchProvider::new().with_items("Music", 1);
    let (_, service) = memory_service(provider.clone());
    let job = service.create_job(berlin_request()).await.unwrap().job;
    service.cancel_job(job.id).await.unwrap();

    let summary = service.run_batch().await.unwrap();

    assert_eq!(summary.processed_jobs, 0);
    assert_eq!(provider.calls("Music"), 0);
    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.error.as_deref(), Some("Cancelled by user"));
}

#[tokio::test]
async fn test_running_job_is_skipped_when_configured() {
    let provider = MockSearchProvider::new().with_items("Music", 1);
    let (_, service) = memory_service(provider.clone());
    let job = service.create_job(berlin_request()).await.unwrap().job;
    service
        .jobs()
        .update_job(job.id, JobUpdate::new().with_status(JobStatus::Running))
        .await
        .unwrap();

    let summary = service.run_batch().await.unwrap();

    assert_eq!(summary.processed_jobs, 0);
    assert_eq!(provider.calls("Music"), 0);
}

#[tokio::test]
async fn test_running_job_is_processed_when_not_skipping() {
    let provider = MockSearchProvider::new().with_items("Music", 1);
    let mut config = fast_config();
    config.runner = config.runner.with_skip_running(false);
    let service = service_with(MemoryStore::new(), provider.clone(), config);
    let job = service.create_job(berlin_request()).await.unwrap().job;
    service
        .jobs()
        .update_job(job.id, JobUpdate::new().with_status(JobStatus::Running))
        .await
        .unwrap();

    let summary = service.run_batch().await.unwrap();

    assert_eq!(summary.processed_jobs, 1);
    assert_eq!(
        service.get_job(job.id).await.unwrap().status,
        JobStatus::Success
    );
}

#[tokio::test]
async fn test_missing_job_is_skipped() {
    let (_, service) = memory_service(MockSearchProvider::new());
    service.jobs().enqueue(Uuid::new_v4()).await.unwrap();

    let summary = service.run_batch().await.unwrap();

    assert!(summary.started);
    assert_eq!(summary.processed_jobs, 0);
    assert_eq!(service.queue_length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_job_level_error_marks_job_failed_and_releases_lock() {
    // Arrange: every cache key operation fails
    let store = FaultyStore::failing_prefix("cache:");
    let service = service_with(store.clone(), MockSearchProvider::new(), fast_config());
    let job = service.create_job(berlin_request()).await.unwrap().job;

    // Act
    let summary = service.run_batch().await.unwrap();

    // Assert
    assert_eq!(summary.processed_jobs, 1);
    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_deref(),
        Some("Storage is unavailable. Is the database running?")
    );
    assert!(store.inner.get(RUNNER_LOCK_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_before_start_processes_nothing() {
    let (_, service) = memory_service(MockSearchProvider::new());
    service.create_job(berlin_request()).await.unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let summary = service
        .run_batch_cancellable(token, &SilentRunnerReporter)
        .await
        .unwrap();

    assert!(summary.started);
    assert_eq!(summary.processed_jobs, 0);
    assert_eq!(service.queue_length().await.unwrap(), 1);
}

#[tokio::test]
async fn test_lock_is_extended_during_long_pass() {
    let provider = MockSearchProvider::new().with_items("Music", 1);
    let mut config = fast_config();
    config.runner = RunnerConfig::default()
        .with_category_pacing(Duration::from_millis(30))
        .with_extend_lock_every(Duration::from_millis(10))
        .with_lock_ttl(Duration::from_millis(500));
    let store = MemoryStore::new();
    let service = service_with(store.clone(), provider, config);
    let job = service.create_job(berlin_request()).await.unwrap().job;

    let summary = service.run_batch().await.unwrap();

    assert!(summary.started);
    assert_eq!(
        service.get_job(job.id).await.unwrap().status,
        JobStatus::Success
    );
    assert!(store.get(RUNNER_LOCK_KEY).await.unwrap().is_none());
}

// =============================================================================
// Cancellation while running
// =============================================================================

/// Provider that cancels a job through the store on its first call.
#[derive(Clone)]
struct CancellingProvider {
    jobs: JobStore<MemoryStore>,
    target: Arc<Mutex<Option<Uuid>>>,
    calls: Arc<Mutex<usize>>,
}

impl SearchProvider for CancellingProvider {
    async fn search(
        &self,
        query: &SearchQuery,
        _cancel: CancellationToken,
    ) -> Result<Vec<EventItem>, AppError> {
        *self.calls.lock().unwrap() += 1;
        let target = *self.target.lock().unwrap();
        if let Some(id) = target {
            self.jobs
                .update_job(
                    id,
                    JobUpdate::new()
                        .with_status(JobStatus::Cancelled)
                        .with_error("Cancelled by user"),
                )
                .await?;
        }
        Ok(items_for(&query.category, 1))
    }
}

#[tokio::test]
async fn test_cancellation_between_categories_stops_job() {
    // Arrange
    let store = MemoryStore::new();
    let provider = CancellingProvider {
        jobs: JobStore::new(store.clone(), JobStoreConfig::default()),
        target: Arc::new(Mutex::new(None)),
        calls: Arc::new(Mutex::new(0)),
    };
    let service = JobService::new(
        store,
        provider.clone(),
        IdentityNormalizer,
        fast_config(),
    );
    let job = service.create_job(berlin_request()).await.unwrap().job;
    *provider.target.lock().unwrap() = Some(job.id);

    // Act
    service.run_batch().await.unwrap();

    // Assert
    let job = service.get_job(job.id).await.unwrap();
    assert_eq!(*provider.calls.lock().unwrap(), 1);
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.error.as_deref(), Some("Cancelled by user"));
    assert_eq!(
        job.category_state("Music").unwrap().state,
        CategoryStatus::Completed
    );
    assert_eq!(
        job.category_state("Theater").unwrap().state,
        CategoryStatus::NotStarted
    );
}

// =============================================================================
// Lock taken over mid-pass
// =============================================================================

/// Provider that replaces the global runner lock with another owner's,
/// as if the lock had lapsed and a second pass had acquired it.
#[derive(Clone)]
struct LockStealingProvider {
    store: MemoryStore,
}

impl SearchProvider for LockStealingProvider {
    async fn search(
        &self,
        query: &SearchQuery,
        _cancel: CancellationToken,
    ) -> Result<Vec<EventItem>, AppError> {
        self.store
            .set(RUNNER_LOCK_KEY, json!({"owner": "second-pass"}), None)
            .await?;
        Ok(items_for(&query.category, 1))
    }
}

#[tokio::test]
async fn test_lost_lock_stops_pass_and_is_not_released() {
    // Arrange
    let store = MemoryStore::new();
    let mut config = fast_config();
    config.runner = config.runner.with_extend_lock_every(Duration::ZERO);
    let service = JobService::new(
        store.clone(),
        LockStealingProvider {
            store: store.clone(),
        },
        IdentityNormalizer,
        config,
    );
    let first = service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap()
        .job;
    let second = service
        .create_job(CreateJobRequest::new("Vienna", "2024-01-15").with_category("Music"))
        .await
        .unwrap()
        .job;

    // Act
    let summary = service.run_batch().await.unwrap();

    // Assert
    assert!(summary.started);
    assert_eq!(summary.processed_jobs, 1);
    assert_eq!(
        service.get_job(first.id).await.unwrap().status,
        JobStatus::Success
    );
    assert_eq!(
        service.get_job(second.id).await.unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(service.queue_length().await.unwrap(), 1);
    assert_eq!(
        store.get(RUNNER_LOCK_KEY).await.unwrap(),
        Some(json!({"owner": "second-pass"}))
    );
}
