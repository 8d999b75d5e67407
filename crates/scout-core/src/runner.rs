//! Bounded batch runner.
//!
//! There is no long-lived worker process. Each call to
//! [`BatchRunner::run_once`] processes at most `max_jobs_per_run` jobs,
//! stops starting new jobs once `max_run` has elapsed, and returns. An
//! external scheduler (cron, the server's interval trigger, a CLI call)
//! invokes it repeatedly.
//!
//! ```text
//! acquire global lock ── held elsewhere ──> return started=false
//!   while under both bounds and the lock is still ours:
//!     refresh lock every extend_lock_every, or sooner if the
//!     remaining lease would not cover one more category
//!     dequeue next id (empty queue ends the pass)
//!     skip missing, cancelled or already running jobs
//!     mark RUNNING, settle cached categories, process the misses
//!     finalize counters and status, persist
//! release global lock if it still carries our owner token
//! ```
//!
//! Only one pass runs at a time across all processes sharing the store.
//! The lock value carries a per-pass owner token, so a pass that lost its
//! lock neither refreshes nor deletes the one a newer pass acquired.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::CategoryCache;
use crate::config::RunnerConfig;
use crate::error::AppError;
use crate::job::{Job, JobStatus, JobUpdate};
use crate::job_store::JobStore;
use crate::processor::CategoryProcessor;
use crate::progress;
use crate::traits::{KvStore, SearchProvider};

/// Key of the global batch runner lock.
pub const RUNNER_LOCK_KEY: &str = "lock:batch-runner";

/// Outcome of one batch runner pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// False when another pass held the global lock.
    pub started: bool,
    pub processed_jobs: usize,
    pub duration_ms: u64,
}

// =============================================================================
// Runner Events
// =============================================================================

/// Events emitted during a batch runner pass.
#[derive(Debug, Clone)]
pub enum RunnerEvent<'a> {
    /// Global lock acquired, pass started.
    Started { max_jobs: usize },
    /// Another pass holds the global lock.
    Skipped,
    /// A job was marked RUNNING.
    JobStarted {
        job_id: Uuid,
        categories: usize,
        cached: usize,
    },
    /// A dequeued job was not processed.
    JobSkipped { job_id: Uuid, reason: &'a str },
    /// A category was settled from the cache.
    CategoryCached {
        job_id: Uuid,
        category: &'a str,
        items: usize,
    },
    /// A category exhausted its retries.
    CategoryFailed {
        job_id: Uuid,
        category: &'a str,
        error: &'a str,
    },
    /// A job reached its final status.
    JobFinished {
        job_id: Uuid,
        status: JobStatus,
        results: usize,
    },
    /// A job could not be processed and was marked FAILED.
    JobFailed { job_id: Uuid, error: &'a str },
    /// Global lock TTL refreshed.
    LockExtended,
    /// The global lock expired or was taken over; no new job is started.
    LockLost,
    /// Pass complete, lock released.
    Finished { summary: &'a RunSummary },
}

// =============================================================================
// Runner Reporter Trait
// =============================================================================

/// Trait for reporting runner events.
pub trait RunnerReporter: Send + Sync {
    /// Called when a runner event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: RunnerEvent<'_>) {
        let _ = event;
    }
}

/// Silent runner reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentRunnerReporter;

impl RunnerReporter for SilentRunnerReporter {}

/// Tracing-based runner reporter for CLI/server logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunnerReporter;

impl RunnerReporter for TracingRunnerReporter {
    fn report(&self, event: RunnerEvent<'_>) {
        match event {
            RunnerEvent::Started { max_jobs } => {
                info!(max_jobs, "Batch run started");
            }
            RunnerEvent::Skipped => {
                info!("Batch run skipped, another run holds the lock");
            }
            RunnerEvent::JobStarted {
                job_id,
                categories,
                cached,
            } => {
                info!(%job_id, categories, cached, "Processing job");
            }
            RunnerEvent::JobSkipped { job_id, reason } => {
                debug!(%job_id, reason, "Job skipped");
            }
            RunnerEvent::CategoryCached {
                job_id,
                category,
                items,
            } => {
                debug!(%job_id, category, items, "Category served from cache");
            }
            RunnerEvent::CategoryFailed {
                job_id,
                category,
                error,
            } => {
                warn!(%job_id, category, error, "Category failed");
            }
            RunnerEvent::JobFinished {
                job_id,
                status,
                results,
            } => {
                info!(%job_id, %status, results, "Job finished");
            }
            RunnerEvent::JobFailed { job_id, error } => {
                error!(%job_id, error, "Job failed");
            }
            RunnerEvent::LockExtended => {
                debug!("Batch runner lock extended");
            }
            RunnerEvent::LockLost => {
                warn!("Batch runner lock lost, no further jobs will be started");
            }
            RunnerEvent::Finished { summary } => {
                info!(
                    processed = summary.processed_jobs,
                    duration_ms = summary.duration_ms,
                    "Batch run finished"
                );
            }
        }
    }
}

// =============================================================================
// Batch Runner
// =============================================================================

enum JobOutcome {
    Finished,
    Skipped,
    Released,
}

/// The global lock as held by one pass.
struct LockKeeper {
    /// Value written at acquisition; refresh and release match against it.
    token: Value,
    last_extended: Instant,
    held: bool,
}

impl LockKeeper {
    fn new() -> Self {
        Self {
            token: json!({ "owner": Uuid::new_v4(), "acquired_at": Utc::now() }),
            last_extended: Instant::now(),
            held: true,
        }
    }
}

/// Processes queued jobs in bounded passes.
#[derive(Debug, Clone)]
pub struct BatchRunner<S: KvStore, P: SearchProvider> {
    jobs: JobStore<S>,
    cache: CategoryCache<S>,
    processor: CategoryProcessor<S, P>,
    config: RunnerConfig,
    category_budget: Duration,
}

impl<S: KvStore, P: SearchProvider> BatchRunner<S, P> {
    pub fn new(
        jobs: JobStore<S>,
        cache: CategoryCache<S>,
        processor: CategoryProcessor<S, P>,
        config: RunnerConfig,
    ) -> Self {
        let category_budget = processor.config().worst_case_category_time();
        Self {
            jobs,
            cache,
            processor,
            config,
            category_budget,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs one bounded pass, logging through tracing.
    pub async fn run_once(&self) -> Result<RunSummary, AppError> {
        self.run_once_cancellable(CancellationToken::new(), &TracingRunnerReporter)
            .await
    }

    /// Runs one bounded pass.
    ///
    /// When `cancel` fires, no new category or job is started; a job that
    /// is interrupted mid-way is put back to PENDING and re-queued. The
    /// global lock is released on every exit path.
    pub async fn run_once_cancellable<R: RunnerReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        let started_at = Instant::now();
        let kv = self.jobs.kv();

        let mut keeper = LockKeeper::new();
        let acquired = kv
            .set_if_absent(
                RUNNER_LOCK_KEY,
                keeper.token.clone(),
                Some(self.config.lock_ttl),
            )
            .await?;
        if !acquired {
            reporter.report(RunnerEvent::Skipped);
            return Ok(RunSummary {
                started: false,
                processed_jobs: 0,
                duration_ms: elapsed_ms(started_at),
            });
        }

        reporter.report(RunnerEvent::Started {
            max_jobs: self.config.max_jobs_per_run,
        });

        let result = self
            .run_locked(started_at, &cancel, &mut keeper, reporter)
            .await;

        match kv.delete_if_eq(RUNNER_LOCK_KEY, &keeper.token).await {
            Ok(true) => {}
            Ok(false) => debug!("Batch runner lock no longer ours, left in place"),
            Err(e) => error!(error = %e, "Failed to release batch runner lock"),
        }

        let summary = RunSummary {
            started: true,
            processed_jobs: result?,
            duration_ms: elapsed_ms(started_at),
        };
        reporter.report(RunnerEvent::Finished { summary: &summary });
        Ok(summary)
    }

    async fn run_locked<R: RunnerReporter>(
        &self,
        started_at: Instant,
        cancel: &CancellationToken,
        keeper: &mut LockKeeper,
        reporter: &R,
    ) -> Result<usize, AppError> {
        let mut processed = 0;

        while processed < self.config.max_jobs_per_run
            && started_at.elapsed() < self.config.max_run
            && !cancel.is_cancelled()
        {
            if !self.keep_lock(keeper, Duration::ZERO, reporter).await {
                break;
            }

            let Some(job_id) = self.jobs.dequeue().await? else {
                debug!("Queue empty");
                break;
            };

            match self.process_job(job_id, cancel, keeper, reporter).await {
                Ok(JobOutcome::Finished) => processed += 1,
                Ok(JobOutcome::Skipped) => {}
                Ok(JobOutcome::Released) => break,
                Err(e) => {
                    processed += 1;
                    let message = e.user_message();
                    reporter.report(RunnerEvent::JobFailed {
                        job_id,
                        error: &message,
                    });
                    let update = JobUpdate::new()
                        .with_status(JobStatus::Failed)
                        .with_error(message)
                        .with_completed_at(Utc::now());
                    if let Err(e) = self.jobs.update_job(job_id, update).await {
                        error!(%job_id, error = %e, "Failed to mark job as failed");
                    }
                }
            }
        }

        Ok(processed)
    }

    async fn process_job<R: RunnerReporter>(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
        keeper: &mut LockKeeper,
        reporter: &R,
    ) -> Result<JobOutcome, AppError> {
        let Some(job) = self.jobs.get_job(job_id).await? else {
            reporter.report(RunnerEvent::JobSkipped {
                job_id,
                reason: "missing or expired",
            });
            return Ok(JobOutcome::Skipped);
        };
        let skip_reason = match job.status {
            JobStatus::Cancelled => Some("cancelled"),
            JobStatus::Running if self.config.skip_running => Some("already running"),
            status if status.is_terminal() => Some("already finished"),
            _ => None,
        };
        if let Some(reason) = skip_reason {
            reporter.report(RunnerEvent::JobSkipped { job_id, reason });
            return Ok(JobOutcome::Skipped);
        }

        let mut job = self
            .jobs
            .update_job(
                job_id,
                JobUpdate::new()
                    .with_status(JobStatus::Running)
                    .with_started_at(Utc::now()),
            )
            .await?;

        let pending = job.unsettled_categories();
        let lookup = self.cache.lookup(&job.location, &job.date, &pending).await?;
        reporter.report(RunnerEvent::JobStarted {
            job_id,
            categories: job.categories.len(),
            cached: lookup.hits.len(),
        });

        for category in &pending {
            if let Some(items) = lookup.hits.get(category) {
                job.results.extend(items.iter().cloned());
                progress::complete_category(&mut job, category, items.len());
                reporter.report(RunnerEvent::CategoryCached {
                    job_id,
                    category,
                    items: items.len(),
                });
            }
        }
        if !lookup.hits.is_empty() {
            self.persist_partial(&job).await;
        }

        for (index, category) in lookup.misses.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.release_job(&job).await;
            }
            if index > 0 && !self.config.category_pacing.is_zero() {
                tokio::time::sleep(self.config.category_pacing).await;
            }
            // The current job runs to completion even if the lock was lost.
            self.keep_lock(keeper, self.category_budget, reporter).await;

            if self.cancelled_in_store(&mut job).await? {
                break;
            }

            match self.processor.process_category(&mut job, category).await {
                Ok(items) => job.results.extend(items),
                Err(e) => {
                    let message = e.to_string();
                    reporter.report(RunnerEvent::CategoryFailed {
                        job_id,
                        category,
                        error: &message,
                    });
                }
            }
            self.persist_partial(&job).await;
        }

        self.cancelled_in_store(&mut job).await?;
        let status = progress::finalize(&mut job);
        self.jobs
            .update_job(job_id, JobUpdate::snapshot_of(&job))
            .await?;

        reporter.report(RunnerEvent::JobFinished {
            job_id,
            status,
            results: job.results.len(),
        });
        Ok(JobOutcome::Finished)
    }

    /// Picks up a cancellation made through the job service while this job
    /// was being processed.
    async fn cancelled_in_store(&self, job: &mut Job) -> Result<bool, AppError> {
        if job.status == JobStatus::Cancelled {
            return Ok(true);
        }
        let Some(stored) = self.jobs.get_job(job.id).await? else {
            return Ok(false);
        };
        if stored.status != JobStatus::Cancelled {
            return Ok(false);
        }
        info!(job_id = %job.id, "Job cancelled while running, stopping");
        job.status = JobStatus::Cancelled;
        job.error = stored.error;
        job.completed_at = stored.completed_at;
        Ok(true)
    }

    async fn release_job(&self, job: &Job) -> Result<JobOutcome, AppError> {
        info!(job_id = %job.id, "Shutdown requested, returning job to the queue");
        let mut update = JobUpdate::snapshot_of(job);
        update.status = Some(JobStatus::Pending);
        self.jobs.update_job(job.id, update).await?;
        self.jobs.enqueue(job.id).await?;
        Ok(JobOutcome::Released)
    }

    async fn persist_partial(&self, job: &Job) {
        let update = JobUpdate::new()
            .with_results(job.results.clone())
            .with_progress(job.progress.clone());
        if let Err(e) = self.jobs.update_job(job.id, update).await {
            warn!(job_id = %job.id, error = %e, "Failed to persist partial results");
        }
    }

    /// Refreshes the global lock when due, or early when the remaining
    /// lease would not cover `upcoming`. Returns whether the lock is still
    /// held by this pass.
    async fn keep_lock<R: RunnerReporter>(
        &self,
        keeper: &mut LockKeeper,
        upcoming: Duration,
        reporter: &R,
    ) -> bool {
        if !keeper.held {
            return false;
        }
        let elapsed = keeper.last_extended.elapsed();
        if elapsed < self.config.extend_lock_every
            && elapsed.saturating_add(upcoming) < self.config.lock_ttl
        {
            return true;
        }
        keeper.last_extended = Instant::now();
        match self
            .jobs
            .kv()
            .expire_if_eq(RUNNER_LOCK_KEY, &keeper.token, self.config.lock_ttl)
            .await
        {
            Ok(true) => reporter.report(RunnerEvent::LockExtended),
            Ok(false) => {
                keeper.held = false;
                reporter.report(RunnerEvent::LockLost);
            }
            Err(e) => warn!(error = %e, "Failed to extend batch runner lock"),
        }
        keeper.held
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
