//! Category processor: one category of one job, with timeout and retries.
//!
//! ```text
//! for attempt in 0..=max_retries {
//!     1. Mark IN_PROGRESS (attempt 0) or RETRIED
//!     2. Take the per-tuple cache lock
//!        - held elsewhere: back off, re-check the cache, next attempt
//!     3. Call the provider, racing a timeout
//!     4. Release the lock
//!     5. Success: mark COMPLETED, cache non-empty results, done
//!        Failure: back off (retry_delay * 2^attempt + jitter), next attempt
//! }
//! Mark FAILED with the last error
//! ```
//!
//! Category state changes are written to the job in memory and persisted
//! best-effort so pollers see progress while the batch is running.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CategoryCache;
use crate::config::ProcessorConfig;
use crate::error::{AppError, ServiceErrorDetails};
use crate::job::{EventItem, Job, JobUpdate};
use crate::job_store::JobStore;
use crate::progress;
use crate::traits::{KvStore, SearchProvider, SearchQuery};

/// Runs provider searches for single categories.
#[derive(Debug, Clone)]
pub struct CategoryProcessor<S: KvStore, P: SearchProvider> {
    provider: P,
    jobs: JobStore<S>,
    cache: CategoryCache<S>,
    config: ProcessorConfig,
}

impl<S: KvStore, P: SearchProvider> CategoryProcessor<S, P> {
    pub fn new(
        provider: P,
        jobs: JobStore<S>,
        cache: CategoryCache<S>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            provider,
            jobs,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Searches one category for `job`, settling its category state.
    ///
    /// Returns the items found (possibly empty). On exhaustion the category
    /// is marked FAILED and [`AppError::ProcessingFailed`] is returned; the
    /// caller is expected to carry on with the remaining categories.
    pub async fn process_category(
        &self,
        job: &mut Job,
        category: &str,
    ) -> Result<Vec<EventItem>, AppError> {
        let query = SearchQuery::new(job.location.clone(), job.date.clone(), category);
        let mut last_error = AppError::Generic("no attempt made".to_string());

        for attempt in 0..=self.config.max_retries {
            progress::start_attempt(job, category, attempt);
            self.persist_progress(job).await;

            let acquired = match self
                .cache
                .acquire_default_lock(&query.location, &query.date, category)
                .await
            {
                Ok(acquired) => acquired,
                Err(e) => {
                    warn!(job_id = %job.id, category, attempt, error = %e, "Could not take category lock");
                    last_error = e;
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                    continue;
                }
            };

            if !acquired {
                debug!(job_id = %job.id, category, attempt, "Category locked by another worker");
                last_error = AppError::LockContention(format!(
                    "{} / {} / {}",
                    query.location, query.date, category
                ));
                if attempt == self.config.max_retries {
                    break;
                }
                tokio::time::sleep(self.delay_for(attempt)).await;
                if let Some(items) = self.cached_items(&query).await {
                    info!(job_id = %job.id, category, items = items.len(), "Category filled by another worker");
                    progress::complete_category(job, category, items.len());
                    self.persist_progress(job).await;
                    return Ok(items);
                }
                continue;
            }

            let result = self.search_with_timeout(&query).await;
            if let Err(e) = self
                .cache
                .release_lock(&query.location, &query.date, category)
                .await
            {
                warn!(job_id = %job.id, category, error = %e, "Failed to release category lock");
            }

            match result {
                Ok(mut items) => {
                    for item in &mut items {
                        item.category = category.to_string();
                    }
                    progress::complete_category(job, category, items.len());
                    self.persist_progress(job).await;
                    if !items.is_empty() {
                        if let Err(e) = self
                            .cache
                            .store(&query.location, &query.date, category, &items, None)
                            .await
                        {
                            warn!(job_id = %job.id, category, error = %e, "Failed to cache results");
                        }
                    }
                    debug!(job_id = %job.id, category, attempt, items = items.len(), "Category completed");
                    return Ok(items);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        job_id = %job.id,
                        category,
                        attempt,
                        retryable,
                        error = %e,
                        "Category search failed"
                    );
                    last_error = e;
                    if !retryable {
                        break;
                    }
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }

        let message = last_error.to_string();
        progress::fail_category(job, category, message.clone());
        self.persist_progress(job).await;
        Err(AppError::ProcessingFailed {
            category: category.to_string(),
            message,
        })
    }

    /// Calls the provider, giving up after the configured timeout.
    ///
    /// On timeout the token handed to the provider is cancelled; the request
    /// itself may still complete on the provider side.
    async fn search_with_timeout(&self, query: &SearchQuery) -> Result<Vec<EventItem>, AppError> {
        let token = CancellationToken::new();
        tokio::select! {
            result = self.provider.search(query, token.clone()) => result,
            _ = tokio::time::sleep(self.config.timeout) => {
                token.cancel();
                let timeout_ms =
                    u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);
                Err(AppError::ServiceError(ServiceErrorDetails::timeout(timeout_ms)))
            }
        }
    }

    async fn cached_items(&self, query: &SearchQuery) -> Option<Vec<EventItem>> {
        let categories = [query.category.clone()];
        match self
            .cache
            .lookup(&query.location, &query.date, &categories)
            .await
        {
            Ok(mut lookup) => lookup.hits.remove(&query.category),
            Err(e) => {
                warn!(category = %query.category, error = %e, "Cache re-check failed");
                None
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.backoff(attempt);
        if !self.config.jitter {
            return base;
        }
        let max_jitter = u64::try_from(base.as_millis()).unwrap_or(u64::MAX) / 4;
        if max_jitter == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
    }

    async fn persist_progress(&self, job: &Job) {
        let update = JobUpdate::new().with_progress(job.progress.clone());
        if let Err(e) = self.jobs.update_job(job.id, update).await {
            warn!(job_id = %job.id, error = %e, "Failed to persist category progress");
        }
    }
}
