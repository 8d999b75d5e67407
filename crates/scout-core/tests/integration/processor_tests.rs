//! Integration tests for the category processor: retries, timeouts and
//! per-tuple lock handling.

use std::time::Duration;

use scout_core::{
    AppError, CacheConfig, CategoryCache, CategoryProcessor, CategoryStatus, CreateJobRequest,
    Job, JobStore, JobStoreConfig, MemoryStore, ProcessorConfig, ServiceErrorKind,
};

use crate::integration::common::{MockResponse, MockSearchProvider, items_for};

struct Fixture {
    jobs: JobStore<MemoryStore>,
    cache: CategoryCache<MemoryStore>,
    processor: CategoryProcessor<MemoryStore, MockSearchProvider>,
    provider: MockSearchProvider,
}

fn fixture(provider: MockSearchProvider, config: ProcessorConfig) -> Fixture {
    let store = MemoryStore::new();
    let jobs = JobStore::new(store.clone(), JobStoreConfig::default());
    let cache = CategoryCache::new(store, CacheConfig::default());
    let processor = CategoryProcessor::new(provider.clone(), jobs.clone(), cache.clone(), config);
    Fixture {
        jobs,
        cache,
        processor,
        provider,
    }
}

fn fast() -> ProcessorConfig {
    ProcessorConfig::default()
        .with_timeout(Duration::from_millis(100))
        .with_retry_delay(Duration::from_millis(1))
        .without_jitter()
}

async fn music_job(jobs: &JobStore<MemoryStore>) -> Job {
    jobs.create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap()
        .job
}

#[tokio::test]
async fn test_success_marks_completed_and_caches() {
    // Arrange
    let f = fixture(MockSearchProvider::new().with_items("Music", 3), fast());
    let mut job = music_job(&f.jobs).await;

    // Act
    let items = f.processor.process_category(&mut job, "Music").await.unwrap();

    // Assert
    assert_eq!(items.len(), 3);
    let state = job.category_state("Music").unwrap();
    assert_eq!(state.state, CategoryStatus::Completed);
    assert_eq!(state.result_count, Some(3));
    assert_eq!(job.progress.completed_categories, 1);

    let lookup = f
        .cache
        .lookup("Berlin", "2024-01-15", &["Music".to_string()])
        .await
        .unwrap();
    assert_eq!(lookup.hits["Music"].len(), 3);

    let stored = f.jobs.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(
        stored.category_state("Music").unwrap().state,
        CategoryStatus::Completed
    );
}

#[tokio::test]
async fn test_zero_items_complete_without_caching() {
    let f = fixture(MockSearchProvider::new(), fast());
    let mut job = music_job(&f.jobs).await;

    let items = f.processor.process_category(&mut job, "Music").await.unwrap();

    assert!(items.is_empty());
    assert_eq!(
        job.category_state("Music").unwrap().state,
        CategoryStatus::Completed
    );
    let lookup = f
        .cache
        .lookup("Berlin", "2024-01-15", &["Music".to_string()])
        .await
        .unwrap();
    assert_eq!(lookup.misses, vec!["Music".to_string()]);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let provider = MockSearchProvider::new().scripted(
        "Music",
        vec![
            MockResponse::Fail(ServiceErrorKind::Unavailable),
            MockResponse::Items(2),
        ],
    );
    let f = fixture(provider, fast());
    let mut job = music_job(&f.jobs).await;

    let items = f.processor.process_category(&mut job, "Music").await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(f.provider.calls("Music"), 2);
    let state = job.category_state("Music").unwrap();
    assert_eq!(state.state, CategoryStatus::Completed);
    assert_eq!(state.retry_count, 1);
}

#[tokio::test]
async fn test_exhausted_retries_mark_failed() {
    let provider = MockSearchProvider::new().always_failing("Music", ServiceErrorKind::RateLimit);
    let f = fixture(provider, fast().with_max_retries(2));
    let mut job = music_job(&f.jobs).await;

    let err = f
        .processor
        .process_category(&mut job, "Music")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProcessingFailed { ref category, .. } if category == "Music"));
    assert_eq!(f.provider.calls("Music"), 3);
    let state = job.category_state("Music").unwrap();
    assert_eq!(state.state, CategoryStatus::Failed);
    assert_eq!(state.retry_count, 2);
    assert!(state.error.as_deref().unwrap().contains("rate limited"));
    assert_eq!(job.progress.failed_categories, 1);
    assert!(!f.cache.is_locked("Berlin", "2024-01-15", "Music").await.unwrap());
}

#[tokio::test]
async fn test_authentication_failure_is_not_retried() {
    let provider =
        MockSearchProvider::new().always_failing("Music", ServiceErrorKind::Authentication);
    let f = fixture(provider, fast().with_max_retries(3));
    let mut job = music_job(&f.jobs).await;

    assert!(f.processor.process_category(&mut job, "Music").await.is_err());
    assert_eq!(f.provider.calls("Music"), 1);
}

#[tokio::test]
async fn test_timeout_cancels_slow_provider() {
    let provider = MockSearchProvider::new().scripted(
        "Music",
        vec![MockResponse::Hang(Duration::from_secs(10))],
    );
    let f = fixture(
        provider,
        fast()
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(0),
    );
    let mut job = music_job(&f.jobs).await;

    let started = std::time::Instant::now();
    let err = f
        .processor
        .process_category(&mut job, "Music")
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(err.to_string().contains("timeout"));
    assert!(err.to_string().contains("no response after 50 ms"));
    assert_eq!(
        job.category_state("Music").unwrap().state,
        CategoryStatus::Failed
    );
}

#[tokio::test]
async fn test_locked_tuple_is_not_fetched_and_eventually_fails() {
    // Arrange: another worker holds the lock for the whole test
    let f = fixture(MockSearchProvider::new().with_items("Music", 5), fast().with_max_retries(1));
    assert!(
        f.cache
            .acquire_lock("Berlin", "2024-01-15", "Music", Duration::from_secs(60))
            .await
            .unwrap()
    );
    let mut job = music_job(&f.jobs).await;

    // Act
    let err = f
        .processor
        .process_category(&mut job, "Music")
        .await
        .unwrap_err();

    // Assert
    assert_eq!(f.provider.calls("Music"), 0);
    assert!(err.to_string().contains("Lock already held"));
    assert_eq!(
        job.category_state("Music").unwrap().state,
        CategoryStatus::Failed
    );
    assert!(f.cache.is_locked("Berlin", "2024-01-15", "Music").await.unwrap());
}

#[tokio::test]
async fn test_locked_tuple_uses_results_cached_by_holder() {
    let f = fixture(MockSearchProvider::new().with_items("Music", 5), fast());
    f.cache
        .acquire_lock("Berlin", "2024-01-15", "Music", Duration::from_secs(60))
        .await
        .unwrap();
    f.cache
        .store("Berlin", "2024-01-15", "Music", &items_for("Music", 2), None)
        .await
        .unwrap();
    let mut job = music_job(&f.jobs).await;

    let items = f.processor.process_category(&mut job, "Music").await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(f.provider.calls("Music"), 0);
    assert_eq!(
        job.category_state("Music").unwrap().state,
        CategoryStatus::Completed
    );
}

#[tokio::test]
async fn test_items_are_labelled_with_canonical_category() {
    let f = fixture(MockSearchProvider::new().with_items("Music", 2), fast());
    let mut job = music_job(&f.jobs).await;

    let items = f.processor.process_category(&mut job, "Music").await.unwrap();

    assert!(items.iter().all(|i| i.category == "Music"));
}
