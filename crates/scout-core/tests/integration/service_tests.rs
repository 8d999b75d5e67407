//! Integration tests for the caller-facing job service.

use scout_core::{
    AliasNormalizer, AppError, CreateJobRequest, JobService, JobStatus, JobSummary, MemoryStore,
};
use uuid::Uuid;

use crate::integration::common::{
    FailingStore, MockSearchProvider, fast_config, memory_service, service_with,
};

#[tokio::test]
async fn test_category_aliases_collapse_to_one_job() {
    // Arrange
    let service = JobService::new(
        MemoryStore::new(),
        MockSearchProvider::new(),
        AliasNormalizer::builtin(),
        fast_config(),
    );

    // Act
    let first = service
        .create_job(
            CreateJobRequest::new("Berlin", "2024-01-15")
                .with_categories(["Clubs & Nachtleben", "discos", "Theatre"]),
        )
        .await
        .unwrap();
    let second = service
        .create_job(
            CreateJobRequest::new("berlin", "2024-01-15").with_categories(["Theater", "Clubs/Discos"]),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(first.job.categories, vec!["Clubs/Discos", "Theater"]);
    assert!(!second.is_new);
    assert_eq!(first.job.id, second.job.id);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_storage() {
    let (_, service) = memory_service(MockSearchProvider::new());

    let cases = [
        CreateJobRequest::new("", "2024-01-15").with_category("Music"),
        CreateJobRequest::new("Berlin", "tomorrow").with_category("Music"),
        CreateJobRequest::new("Berlin", "2024-01-15"),
        CreateJobRequest::new("Berlin", "2024-01-15").with_category("   "),
    ];
    for request in cases {
        let err = service.create_job(request).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)), "got {err:?}");
    }

    assert_eq!(service.queue_length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_ttl_is_rejected_and_service_stays_usable() {
    let (_, service) = memory_service(MockSearchProvider::new());

    let err = service
        .create_job(
            CreateJobRequest::new("Berlin", "2024-01-15")
                .with_category("Music")
                .with_ttl_seconds(100_000_000_000_000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)), "got {err:?}");
    assert_eq!(service.queue_length().await.unwrap(), 0);

    let created = service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap();
    assert!(created.is_new);
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let (_, service) = memory_service(MockSearchProvider::new());

    let err = service.get_job(Uuid::new_v4()).await.unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cancel_pending_job() {
    // Arrange
    let (_, service) = memory_service(MockSearchProvider::new());
    let job = service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap()
        .job;

    // Act
    let cancelled = service.cancel_job(job.id).await.unwrap();
    let again = service.cancel_job(job.id).await;

    // Assert
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert!(matches!(again, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn test_cancel_finished_job_is_rejected() {
    let provider = MockSearchProvider::new().with_items("Music", 1);
    let (_, service) = memory_service(provider);
    let job = service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap()
        .job;
    service.run_batch().await.unwrap();

    let err = service.cancel_job(job.id).await.unwrap_err();

    assert!(matches!(err, AppError::ValidationError(_)));
    assert_eq!(
        service.get_job(job.id).await.unwrap().status,
        JobStatus::Success
    );
}

#[tokio::test]
async fn test_summary_reflects_progress() {
    let provider = MockSearchProvider::new().with_items("Music", 2);
    let (_, service) = memory_service(provider);
    let job = service
        .create_job(
            CreateJobRequest::new("Berlin", "2024-01-15").with_categories(["Music", "Theater"]),
        )
        .await
        .unwrap()
        .job;
    service.run_batch().await.unwrap();

    let summary = JobSummary::from(&service.get_job(job.id).await.unwrap());

    assert_eq!(summary.status, JobStatus::Success);
    assert_eq!(summary.completed_categories, 2);
    assert_eq!(summary.result_count, 2);
    assert_eq!(summary.categories[0].result_count, Some(2));
    assert_eq!(summary.categories[1].result_count, Some(0));
}

#[tokio::test]
async fn test_health_check() {
    let (_, service) = memory_service(MockSearchProvider::new());
    assert!(service.health_check().await.is_ok());

    let down = service_with(FailingStore, MockSearchProvider::new(), fast_config());
    assert!(matches!(
        down.health_check().await,
        Err(AppError::StorageError(_))
    ));
}

#[tokio::test]
async fn test_storage_failure_surfaces_on_create() {
    let service = service_with(FailingStore, MockSearchProvider::new(), fast_config());

    let err = service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StorageError(_)));
    assert!(err.is_retryable());
}
