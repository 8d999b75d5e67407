//! Job persistence, signature index and pending queue.
//!
//! Jobs are stored as JSON records under `job:{id}` with a TTL, indexed by
//! signature under `job:sig:{signature}`, and their ids are pushed onto the
//! `jobs:pending` queue when created.
//!
//! Updates are read-modify-write merges. Two writers updating the same job
//! concurrently race and the last write wins; `Job::version` only records
//! how many writes happened.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{decode_record, encode_record};
use crate::config::JobStoreConfig;
use crate::error::AppError;
use crate::job::{CreateJobOutcome, CreateJobRequest, Job, JobStatus, JobUpdate};
use crate::signature::signature;
use crate::traits::KvStore;

/// Queue holding ids of jobs waiting for a batch runner.
pub const PENDING_QUEUE: &str = "jobs:pending";

pub(crate) fn job_key(id: Uuid) -> String {
    format!("job:{id}")
}

pub(crate) fn signature_key(signature: &str) -> String {
    format!("job:sig:{signature}")
}

/// Value stored under the signature index key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignatureIndex {
    job_id: Uuid,
}

/// Removes duplicate categories, keeping the first occurrence.
fn dedup_in_order(categories: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    categories
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Job store over any [`KvStore`].
#[derive(Debug, Clone)]
pub struct JobStore<S: KvStore> {
    store: S,
    config: JobStoreConfig,
}

impl<S: KvStore> JobStore<S> {
    pub fn new(store: S, config: JobStoreConfig) -> Self {
        Self { store, config }
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &JobStoreConfig {
        &self.config
    }

    /// Creates a job, or returns the live job with the same signature.
    ///
    /// Categories are expected in canonical form; duplicates are dropped
    /// keeping request order. A stale job with the same signature is
    /// deleted and replaced (`is_stale = true`).
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<CreateJobOutcome, AppError> {
        let location = request.location.trim().to_string();
        let categories = dedup_in_order(request.categories);
        let sig = signature(&location, &request.date, &categories);

        let mut is_stale = false;
        if let Some(existing) = self.find_job_by_signature(&sig).await? {
            if !self.is_job_stale(&existing) {
                debug!(job_id = %existing.id, signature = %sig, "Returning existing job");
                return Ok(CreateJobOutcome {
                    job: existing,
                    is_new: false,
                    is_stale: false,
                });
            }
            info!(
                job_id = %existing.id,
                status = %existing.status,
                signature = %sig,
                "Replacing stale job"
            );
            self.delete_job(existing.id).await?;
            is_stale = true;
        }

        let ttl_seconds = request
            .ttl_seconds
            .unwrap_or_else(|| self.config.job_ttl.as_secs());
        let mut job = Job::new(sig.clone(), location, request.date, categories, ttl_seconds);
        job.version = 1;
        self.put_job(&job).await?;

        // The record is written before the index is claimed, so a reader that
        // wins the index never sees it pointing at nothing.
        let index = encode_record(&SignatureIndex { job_id: job.id })?;
        let ttl = Some(Duration::from_secs(ttl_seconds));
        if !self
            .store
            .set_if_absent(&signature_key(&sig), index.clone(), ttl)
            .await?
        {
            if let Some(winner) = self.find_job_by_signature(&sig).await? {
                self.store.delete(&job_key(job.id)).await?;
                debug!(job_id = %winner.id, signature = %sig, "Lost creation race, returning winner");
                return Ok(CreateJobOutcome {
                    job: winner,
                    is_new: false,
                    is_stale,
                });
            }
            self.store.set(&signature_key(&sig), index, ttl).await?;
        }

        self.enqueue(job.id).await?;
        info!(
            job_id = %job.id,
            signature = %sig,
            categories = job.categories.len(),
            "Job created"
        );

        Ok(CreateJobOutcome {
            job,
            is_new: true,
            is_stale,
        })
    }

    /// Fetches a job. A corrupt record is deleted and reported as absent.
    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        let key = job_key(id);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match decode_record::<Job>(value) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!(job_id = %id, error = %e, "Deleting unreadable job record");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// Merges `update` into the stored job and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// [`AppError::JobNotFound`] if the job does not exist.
    pub async fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<Job, AppError> {
        let mut job = self
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        update.apply_to(&mut job);
        job.updated_at = Utc::now();
        job.version += 1;
        self.put_job(&job).await?;
        Ok(job)
    }

    /// Removes a job and, if it still points at this job, its signature index.
    pub async fn delete_job(&self, id: Uuid) -> Result<bool, AppError> {
        let job = self.get_job(id).await?;
        let removed = self.store.delete(&job_key(id)).await?;

        if let Some(job) = job {
            let key = signature_key(&job.signature);
            let points_here = match self.store.get(&key).await? {
                Some(value) => decode_record::<SignatureIndex>(value)
                    .map(|index| index.job_id == id)
                    .unwrap_or(true),
                None => false,
            };
            if points_here {
                self.store.delete(&key).await?;
            }
        }

        if removed {
            debug!(job_id = %id, "Job deleted");
        }
        Ok(removed)
    }

    /// Looks up a job through the signature index, cleaning up index
    /// entries that point at missing jobs.
    pub async fn find_job_by_signature(&self, signature: &str) -> Result<Option<Job>, AppError> {
        let key = signature_key(signature);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let index = match decode_record::<SignatureIndex>(value) {
            Ok(index) => index,
            Err(e) => {
                warn!(signature, error = %e, "Deleting unreadable signature index");
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };

        match self.get_job(index.job_id).await? {
            Some(job) => Ok(Some(job)),
            None => {
                debug!(signature, job_id = %index.job_id, "Removing dangling signature index");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// Whether an identical request should get a fresh job instead of this one.
    pub fn is_job_stale(&self, job: &Job) -> bool {
        self.is_job_stale_at(job, Utc::now())
    }

    /// Staleness evaluated at `now`:
    /// - created longer ago than `stale_after`
    /// - SUCCESS, FAILED or CANCELLED and settled longer ago than `terminal_stale_after`
    /// - RUNNING without an update for longer than `running_watchdog`
    pub fn is_job_stale_at(&self, job: &Job, now: DateTime<Utc>) -> bool {
        let cfg = &self.config.staleness;
        if age(job.created_at, now) > cfg.stale_after {
            return true;
        }
        match job.status {
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled => {
                let settled_at = job.completed_at.unwrap_or(job.updated_at);
                age(settled_at, now) > cfg.terminal_stale_after
            }
            JobStatus::Running => age(job.updated_at, now) > cfg.running_watchdog,
            _ => false,
        }
    }

    pub async fn enqueue(&self, id: Uuid) -> Result<(), AppError> {
        self.store.push(PENDING_QUEUE, &id.to_string()).await
    }

    /// Pops the next job id. Never blocks; `None` means the queue is empty.
    pub async fn dequeue(&self) -> Result<Option<Uuid>, AppError> {
        while let Some(member) = self.store.pop(PENDING_QUEUE).await? {
            match Uuid::parse_str(&member) {
                Ok(id) => return Ok(Some(id)),
                Err(_) => warn!(member = %member, "Dropping malformed queue entry"),
            }
        }
        Ok(None)
    }

    pub async fn queue_length(&self) -> Result<u64, AppError> {
        self.store.queue_len(PENDING_QUEUE).await
    }

    async fn put_job(&self, job: &Job) -> Result<(), AppError> {
        let value = encode_record(job)?;
        self.store
            .set(
                &job_key(job.id),
                value,
                Some(Duration::from_secs(job.ttl_seconds)),
            )
            .await
    }
}
