//! Admin token check for the batch trigger.
//!
//! `POST /api/v1/batch/run` is the only protected route. It is disabled
//! outright when the server starts without `SCOUT_ADMIN_TOKEN`.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Shared secret guarding the batch trigger.
#[derive(Clone)]
pub struct AdminToken(Arc<str>);

impl AdminToken {
    /// Wraps a configured token. Blank values disable the trigger.
    pub fn new(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        (!raw.is_empty()).then(|| Self(Arc::from(raw)))
    }

    pub fn from_config(config: &ServerConfig) -> Option<Self> {
        config.admin_token.as_deref().and_then(Self::new)
    }

    /// Compares in time independent of where the first mismatch is.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(***)")
    }
}

/// Credentials of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Lets the request through only with the configured admin token.
///
/// Answers 403 when no token is configured and 401 when the bearer
/// credentials are missing or wrong.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.admin_token else {
        return Err(ApiError::Forbidden(
            "The batch trigger is disabled; set SCOUT_ADMIN_TOKEN to enable it".to_string(),
        ));
    };

    match bearer_token(request.headers()) {
        Some(token) if expected.matches(token) => Ok(next.run(request).await),
        Some(_) => {
            warn!("Rejected batch trigger with an invalid admin token");
            Err(ApiError::Unauthorized("Invalid admin token".to_string()))
        }
        None => Err(ApiError::Unauthorized(
            "Expected Authorization: Bearer <admin token>".to_string(),
        )),
    }
}
