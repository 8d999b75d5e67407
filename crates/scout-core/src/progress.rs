//! Progress state machine.
//!
//! All per-category transitions go through the functions here, so the
//! forward-only rule and counter consistency are enforced in one place.
//! Job-level status is a pure function of the category states plus the
//! results count, see [`derive_final_status`].

use chrono::Utc;

use crate::job::{CategoryStatus, Job, JobStatus};

/// Rewrites `completed_categories` and `failed_categories` from the
/// category states. Idempotent.
pub fn recompute_counters(job: &mut Job) {
    let progress = &mut job.progress;
    progress.total_categories = progress.category_states.len();
    progress.completed_categories = progress
        .category_states
        .values()
        .filter(|s| s.state == CategoryStatus::Completed)
        .count();
    progress.failed_categories = progress
        .category_states
        .values()
        .filter(|s| s.state == CategoryStatus::Failed)
        .count();
}

/// Derives the job status from its category states.
///
/// While any category still has an attempt outstanding the current status
/// is kept. Otherwise, in order:
/// - all completed, no results: `EMPTY`
/// - all completed with results: `SUCCESS`
/// - some completed, some failed: `PARTIAL_SUCCESS`
/// - all failed: `FAILED`
/// - anything else: `FAILED`
pub fn derive_final_status(job: &Job) -> JobStatus {
    let states = &job.progress.category_states;
    if states.values().any(|s| s.state.is_active()) {
        return job.status;
    }

    let total = states.len();
    if total == 0 {
        return JobStatus::Failed;
    }

    let completed = states
        .values()
        .filter(|s| s.state == CategoryStatus::Completed)
        .count();
    let failed = states
        .values()
        .filter(|s| s.state == CategoryStatus::Failed)
        .count();

    if completed == total {
        if job.results.is_empty() {
            JobStatus::Empty
        } else {
            JobStatus::Success
        }
    } else if completed > 0 && failed > 0 {
        JobStatus::PartialSuccess
    } else {
        JobStatus::Failed
    }
}

/// Recomputes counters and, unless the job was cancelled, settles its
/// status. Sets `completed_at` once the status is terminal, and gives a
/// FAILED job an error message if it has none.
pub fn finalize(job: &mut Job) -> JobStatus {
    recompute_counters(job);
    if job.status != JobStatus::Cancelled {
        job.status = derive_final_status(job);
    }
    if job.status.is_terminal() && job.completed_at.is_none() {
        job.completed_at = Some(Utc::now());
    }
    if job.status == JobStatus::Failed && job.error.is_none() {
        job.error = Some(failure_summary(job));
    }
    job.status
}

fn failure_summary(job: &Job) -> String {
    let progress = &job.progress;
    let last_error = job
        .categories
        .iter()
        .rev()
        .filter_map(|c| job.category_state(c))
        .find_map(|s| s.error.as_deref());
    match last_error {
        Some(error) => format!(
            "{} of {} categories failed. Last error: {}",
            progress.failed_categories, progress.total_categories, error
        ),
        None => format!(
            "{} of {} categories could not be completed",
            progress.total_categories - progress.completed_categories,
            progress.total_categories
        ),
    }
}

fn transition(job: &mut Job, category: &str, next: CategoryStatus) -> bool {
    let Some(state) = job.progress.category_states.get_mut(category) else {
        return false;
    };
    if !state.state.can_transition_to(next) {
        return false;
    }
    state.state = next;
    true
}

/// Marks the start of an attempt. Attempt 0 is `IN_PROGRESS`, later
/// attempts are `RETRIED` with `retry_count = attempt`.
///
/// Returns false if the category is unknown or already settled.
pub fn start_attempt(job: &mut Job, category: &str, attempt: u32) -> bool {
    let next = if attempt == 0 {
        CategoryStatus::InProgress
    } else {
        CategoryStatus::Retried
    };
    if !transition(job, category, next) {
        return false;
    }
    if let Some(state) = job.progress.category_states.get_mut(category) {
        state.retry_count = attempt;
        if state.started_at.is_none() {
            state.started_at = Some(Utc::now());
        }
        state.error = None;
    }
    true
}

/// Settles a category as `COMPLETED` with `result_count` items.
pub fn complete_category(job: &mut Job, category: &str, result_count: usize) -> bool {
    if !transition(job, category, CategoryStatus::Completed) {
        return false;
    }
    if let Some(state) = job.progress.category_states.get_mut(category) {
        state.completed_at = Some(Utc::now());
        state.result_count = Some(result_count);
        state.error = None;
    }
    recompute_counters(job);
    true
}

/// Settles a category as `FAILED` with the final error message.
pub fn fail_category(job: &mut Job, category: &str, error: impl Into<String>) -> bool {
    if !transition(job, category, CategoryStatus::Failed) {
        return false;
    }
    if let Some(state) = job.progress.category_states.get_mut(category) {
        state.completed_at = Some(Utc::now());
        state.error = Some(error.into());
    }
    recompute_counters(job);
    true
}
