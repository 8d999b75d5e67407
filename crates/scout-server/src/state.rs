use tokio_util::sync::CancellationToken;

use scout_client::HttpSearchProvider;
use scout_core::{AliasNormalizer, JobService};
use scout_db::StoreBackend;

use crate::auth::AdminToken;

/// Job service as wired by the server.
pub type ScoutService = JobService<StoreBackend, HttpSearchProvider, AliasNormalizer>;

/// Shared application state for all handlers.
///
/// This is wrapped in Arc internally by Axum when using `with_state()`,
/// so all fields must implement Clone (which they do via internal `Arc`s).
#[derive(Clone)]
pub struct AppState {
    /// Job service for create / get / cancel / batch operations
    pub job_service: ScoutService,

    /// Token protecting the batch trigger (None disables it)
    pub admin_token: Option<AdminToken>,

    /// Cancellation token for graceful shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(
        job_service: ScoutService,
        admin_token: Option<AdminToken>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            job_service,
            admin_token,
            shutdown_token,
        }
    }
}
