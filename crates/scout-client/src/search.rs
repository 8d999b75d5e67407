//! HTTP search provider.
//!
//! Sends one `POST` per (location, date, category) with a JSON body and a
//! bearer token, and expects either `{"events": [...]}` or a bare array of
//! events back.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use scout_core::error::{AppError, ServiceErrorDetails, ServiceErrorKind};
use scout_core::traits::{SearchProvider, SearchQuery};
use scout_core::{EventItem, HttpConfig};

/// Environment variable holding the search endpoint URL.
pub const ENDPOINT_ENV: &str = "SCOUT_SEARCH_ENDPOINT";

/// Environment variable holding the search API key.
pub const API_KEY_ENV: &str = "SCOUT_SEARCH_API_KEY";

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Request body for the search endpoint
#[derive(Serialize)]
struct SearchRequest<'a> {
    location: &'a str,
    date: &'a str,
    category: &'a str,
}

/// Response from the search endpoint
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { events: Vec<EventItem> },
    Bare(Vec<EventItem>),
}

impl SearchResponse {
    fn into_events(self) -> Vec<EventItem> {
        match self {
            SearchResponse::Wrapped { events } => events,
            SearchResponse::Bare(events) => events,
        }
    }
}

/// Error response from the search endpoint
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// Classify a non-success HTTP status
fn classify_status(status: StatusCode) -> ServiceErrorKind {
    match status.as_u16() {
        401 | 403 => ServiceErrorKind::Authentication,
        429 => ServiceErrorKind::RateLimit,
        408 => ServiceErrorKind::Timeout,
        500..=599 => ServiceErrorKind::Unavailable,
        _ => ServiceErrorKind::Unknown,
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// HTTP client for the event search API.
///
/// # Security
///
/// The API key is sent in the `Authorization` header, never in the URL, to
/// keep it out of access logs and proxies.
///
/// # Examples
///
/// ```no_run
/// use scout_client::HttpSearchProvider;
/// use scout_core::traits::{SearchProvider, SearchQuery};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = HttpSearchProvider::new("https://search.example.com/v1/events", "key")?;
/// let query = SearchQuery::new("Berlin", "2024-01-15", "Live Music");
/// let events = provider.search(&query, CancellationToken::new()).await?;
/// println!("Found {} events", events.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpSearchProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpSearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchProvider")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpSearchProvider {
    /// Creates a provider with the default HTTP configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the endpoint is not a valid URL or
    /// the API key is empty.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, AppError> {
        Self::with_config(endpoint, api_key, HttpConfig::default())
    }

    pub fn with_config(endpoint: &str, api_key: &str, config: HttpConfig) -> Result<Self, AppError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::ConfigError(format!("invalid search endpoint '{endpoint}': {e}")))?;
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError(format!("{API_KEY_ENV} is empty")));
        }

        let client = Client::builder()
            .user_agent(concat!("Scout/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
            timeout: config.timeout,
        })
    }

    /// Reads `SCOUT_SEARCH_ENDPOINT` and `SCOUT_SEARCH_API_KEY`.
    pub fn from_env() -> Result<Self, AppError> {
        let endpoint = std::env::var(ENDPOINT_ENV)
            .map_err(|_| AppError::ConfigError(format!("{ENDPOINT_ENV} is not set")))?;
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| AppError::ConfigError(format!("{API_KEY_ENV} is not set")))?;
        Self::new(&endpoint, &api_key)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, query: &SearchQuery) -> Result<Vec<EventItem>, AppError> {
        let body = SearchRequest {
            location: &query.location,
            date: &query.date,
            category: &query.category,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => body.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), truncate(&text)),
            };
            return Err(AppError::ServiceError(ServiceErrorDetails::new(
                classify_status(status),
                message,
                status.as_u16(),
            )));
        }

        let events = serde_json::from_str::<SearchResponse>(&text)
            .map_err(|e| {
                AppError::service(
                    ServiceErrorKind::MalformedResponse,
                    format!("Failed to parse response: {e}"),
                    status.as_u16(),
                )
            })?
            .into_events();

        debug!(
            category = %query.category,
            location = %query.location,
            events = events.len(),
            "Search provider answered"
        );
        Ok(events)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            let ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
            AppError::ServiceError(ServiceErrorDetails::timeout(ms))
        } else if e.is_connect() {
            AppError::service(
                ServiceErrorKind::Unavailable,
                format!("Connection failed: {e}"),
                0,
            )
        } else if e.is_decode() {
            AppError::service(ServiceErrorKind::MalformedResponse, e.to_string(), 0)
        } else {
            AppError::service(ServiceErrorKind::Unknown, e.to_string(), 0)
        }
    }
}

impl SearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        query: &SearchQuery,
        cancel: CancellationToken,
    ) -> Result<Vec<EventItem>, AppError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::service(
                ServiceErrorKind::Timeout,
                "request cancelled",
                0,
            )),
            result = self.send(query) => result,
        }
    }
}
