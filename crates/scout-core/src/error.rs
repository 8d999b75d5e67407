use thiserror::Error;

/// Classification of search provider failures.
///
/// Providers report failures in very different shapes (HTTP status codes,
/// transport errors, garbled bodies). They are folded into these kinds so the
/// category processor can decide whether another attempt makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The call did not finish within the configured timeout.
    Timeout,
    /// Provider rejected the call because of rate limiting (429).
    RateLimit,
    /// Provider answered, but the body could not be understood.
    MalformedResponse,
    /// Provider unreachable or returned a server error (5xx).
    Unavailable,
    /// Credentials rejected (401/403).
    Authentication,
    /// Unknown or unclassified error
    Unknown,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::RateLimit => "rate limited",
            ServiceErrorKind::MalformedResponse => "malformed response",
            ServiceErrorKind::Unavailable => "unavailable",
            ServiceErrorKind::Authentication => "authentication failed",
            ServiceErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Structured error details from the search provider.
#[derive(Debug, Clone)]
pub struct ServiceErrorDetails {
    /// The specific error category
    pub kind: ServiceErrorKind,
    /// Human-readable error message
    pub message: String,
    /// HTTP status code, 0 when the failure happened before a response
    pub status_code: u16,
}

impl ServiceErrorDetails {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code,
        }
    }

    /// Shorthand for a timeout that fired before any response arrived.
    pub fn timeout(after_ms: u64) -> Self {
        Self::new(
            ServiceErrorKind::Timeout,
            format!("no response after {} ms", after_ms),
            0,
        )
    }
}

impl std::fmt::Display for ServiceErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status_code == 0 {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{} (HTTP {}): {}", self.kind, self.status_code, self.message)
        }
    }
}

/// Application-wide error types.
///
/// Every fallible operation in Scout returns this enum. Category-level
/// failures are caught and recorded on the job by the batch runner; only
/// storage and configuration problems are expected to reach callers.
///
/// # Examples
///
/// ```
/// use scout_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::ValidationError("location must not be empty".to_string()))
/// }
/// assert!(example().is_err());
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input parameters on a request.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Job absent (never existed, expired or deleted).
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A category (or a whole job) exhausted its retries.
    #[error("Processing failed for '{category}': {message}")]
    ProcessingFailed { category: String, message: String },

    /// External search provider failure.
    #[error("Search provider error: {0}")]
    ServiceError(ServiceErrorDetails),

    /// Persistence layer unavailable or returned garbage.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// JSON serialization or deserialization failed.
    ///
    /// Raised at the single record decoding boundary, see [`crate::codec`].
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Missing or invalid configuration (credentials, endpoints, files).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A lock is already held by someone else.
    ///
    /// Expected during normal operation; callers treat it as "try later".
    #[error("Lock already held: {0}")]
    LockContention(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Shorthand for a search provider failure.
    pub fn service(kind: ServiceErrorKind, message: impl Into<String>, status_code: u16) -> Self {
        AppError::ServiceError(ServiceErrorDetails::new(kind, message, status_code))
    }

    /// Returns a user-friendly error message suitable for job records and CLI output.
    ///
    /// Never includes backtraces or storage internals.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ValidationError(msg) => format!("Invalid request: {}", msg),
            AppError::JobNotFound(id) => format!("Job {} does not exist or has expired", id),
            AppError::ProcessingFailed { category, message } => {
                format!("Search for '{}' failed: {}", category, message)
            }
            AppError::ServiceError(details) => match details.kind {
                ServiceErrorKind::Timeout => {
                    "The search provider did not answer in time.".to_string()
                }
                ServiceErrorKind::RateLimit => {
                    "The search provider is rate limiting requests. Try again later.".to_string()
                }
                ServiceErrorKind::MalformedResponse => {
                    "The search provider returned an unreadable response.".to_string()
                }
                ServiceErrorKind::Unavailable => {
                    "The search provider is currently unavailable.".to_string()
                }
                ServiceErrorKind::Authentication => {
                    "The search provider rejected our credentials.\n   Check SCOUT_SEARCH_API_KEY."
                        .to_string()
                }
                ServiceErrorKind::Unknown => format!("Search provider error: {}", details.message),
            },
            AppError::StorageError(_) => {
                "Storage is unavailable. Is the database running?".to_string()
            }
            AppError::SerializationError(_) => "A stored record could not be read.".to_string(),
            AppError::ConfigError(msg) => {
                format!("Configuration error: {}\n   Check your environment.", msg)
            }
            AppError::LockContention(_) => {
                "Another worker is already processing this request.".to_string()
            }
            AppError::Generic(msg) => msg.clone(),
        }
    }

    /// Returns true if another attempt may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// use scout_core::error::{AppError, ServiceErrorKind};
    ///
    /// let err = AppError::service(ServiceErrorKind::RateLimit, "slow down", 429);
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::service(ServiceErrorKind::Authentication, "bad key", 401);
    /// assert!(!err.is_retryable());
    ///
    /// let err = AppError::ValidationError("bad date".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ServiceError(details) => {
                !matches!(details.kind, ServiceErrorKind::Authentication)
            }
            AppError::StorageError(_) | AppError::LockContention(_) => true,
            _ => false,
        }
    }

    /// Returns true for the "record does not exist" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::JobNotFound(_))
    }
}
