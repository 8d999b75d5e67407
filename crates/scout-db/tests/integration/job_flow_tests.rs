//! End-to-end job lifecycle over PostgreSQL.

use scout_core::{
    CreateJobRequest, IdentityNormalizer, JobService, JobStatus, ScoutConfig,
};
use scout_db::StoreBackend;

use crate::integration::common::{OneEventProvider, setup_test_store};

#[tokio::test]
async fn test_job_lifecycle_against_postgres() {
    // Arrange
    let (store, _container) = setup_test_store().await;
    let service = JobService::new(
        StoreBackend::Postgres(store),
        OneEventProvider,
        IdentityNormalizer,
        ScoutConfig::default(),
    );
    let request =
        CreateJobRequest::new("Berlin", "2024-01-15").with_categories(["Music", "Theater"]);

    // Act
    let created = service.create_job(request.clone()).await.unwrap();
    let duplicate = service.create_job(request).await.unwrap();
    let summary = service.run_batch().await.unwrap();

    // Assert
    assert!(created.is_new);
    assert!(!duplicate.is_new);
    assert_eq!(created.job.id, duplicate.job.id);
    assert_eq!(summary.processed_jobs, 1);
    assert_eq!(service.queue_length().await.unwrap(), 0);

    let job = service.get_job(created.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.results.len(), 2);
    assert_eq!(job.progress.completed_categories, 2);
}

#[tokio::test]
async fn test_results_are_cached_across_jobs() {
    let (store, _container) = setup_test_store().await;
    let service = JobService::new(
        store,
        OneEventProvider,
        IdentityNormalizer,
        ScoutConfig::default(),
    );
    service
        .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_category("Music"))
        .await
        .unwrap();
    service.run_batch().await.unwrap();

    let lookup = service
        .cache()
        .lookup("berlin", "2024-01-15", &["Music".to_string()])
        .await
        .unwrap();

    assert!(lookup.is_hit("Music"));
    assert_eq!(lookup.metadata["Music"].item_count, 1);
}
