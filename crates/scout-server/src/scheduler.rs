//! Periodic batch trigger.
//!
//! Each tick runs one bounded batch pass and then purges expired rows. A
//! pass that overlaps another runner simply reports `started = false`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use scout_core::TracingRunnerReporter;

use crate::state::AppState;

/// Spawns the interval trigger. It exits when the shutdown token fires.
pub fn spawn_batch_trigger(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "Batch trigger started");

        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = state.shutdown_token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let cancel = state.shutdown_token.child_token();
            match state
                .job_service
                .run_batch_cancellable(cancel, &TracingRunnerReporter)
                .await
            {
                Ok(summary) if summary.started => {
                    debug!(processed = summary.processed_jobs, "Scheduled batch pass done");
                }
                Ok(_) => debug!("Another runner is active, skipping tick"),
                Err(e) => error!(error = %e, "Scheduled batch pass failed"),
            }

            if let Err(e) = state.job_service.jobs().kv().purge_expired().await {
                error!(error = %e, "Failed to purge expired keys");
            }
        }

        info!("Batch trigger stopped");
    })
}
