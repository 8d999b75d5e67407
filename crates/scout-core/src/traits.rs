//! Trait definitions for external dependencies.
//!
//! This module defines traits that abstract over the things the orchestration
//! core talks to but does not own:
//!
//! - **Storage**: a key-value store with TTLs, atomic create-if-absent and a
//!   FIFO queue ([`KvStore`])
//! - **Search**: the provider that turns a category query into events
//!   ([`SearchProvider`])
//! - **Normalization**: mapping raw category labels to canonical ones
//!   ([`CategoryNormalizer`])
//!
//! # Example
//!
//! ```
//! use scout_core::traits::{KvStore, SearchProvider, SearchQuery};
//! use tokio_util::sync::CancellationToken;
//!
//! // Business logic uses traits, not concrete types
//! async fn count_events<P: SearchProvider>(
//!     provider: &P,
//!     query: &SearchQuery,
//! ) -> Result<usize, scout_core::AppError> {
//!     let items = provider.search(query, CancellationToken::new()).await?;
//!     Ok(items.len())
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{AppError, EventItem};

/// Key-value store with expiry and a FIFO queue.
///
/// Job records, queue entries, cache entries and all locks live here.
/// Every operation is a single round trip; the only atomicity the core
/// relies on is [`KvStore::set_if_absent`].
pub trait KvStore: Send + Sync + Clone {
    /// Reads a value. Expired keys read as `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>, AppError>> + Send;

    /// Writes a value, replacing any previous one.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to write
    /// * `value` - The record to store
    /// * `ttl` - Lifetime of the key, `None` for no expiry
    fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Writes a value only if the key is absent (or expired).
    ///
    /// # Returns
    ///
    /// True if this call created the key.
    fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Deletes a key. Returns true if something was removed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Resets the lifetime of an existing key.
    ///
    /// Returns false if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration)
    -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Deletes a key only while it still holds `expected`.
    ///
    /// Returns true if this call removed a live key.
    fn delete_if_eq(
        &self,
        key: &str,
        expected: &Value,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Resets the lifetime of a key only while it still holds `expected`.
    ///
    /// Returns false if the key is gone or now holds something else.
    fn expire_if_eq(
        &self,
        key: &str,
        expected: &Value,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Appends a member to the tail of a queue.
    fn push(&self, queue: &str, member: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Removes and returns the head of a queue.
    fn pop(&self, queue: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Number of members currently in a queue.
    fn queue_len(&self, queue: &str) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Cheap connectivity check.
    fn health_check(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A single category search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Location as submitted by the caller.
    pub location: String,
    /// Date, `YYYY-MM-DD`.
    pub date: String,
    /// Canonical category label.
    pub category: String,
}

impl SearchQuery {
    pub fn new(
        location: impl Into<String>,
        date: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            date: date.into(),
            category: category.into(),
        }
    }
}

/// External event search.
///
/// Implementations must observe the cancellation token: once it fires the
/// result is discarded by the caller, so the call should give up as soon as
/// it can.
pub trait SearchProvider: Send + Sync + Clone {
    /// Searches events for one category at one location and date.
    ///
    /// # Errors
    ///
    /// Failures are reported as [`AppError::ServiceError`] with a
    /// [`crate::ServiceErrorKind`] that drives the retry decision.
    fn search(
        &self,
        query: &SearchQuery,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Vec<EventItem>, AppError>> + Send;
}

/// Maps raw category labels to canonical ones.
///
/// Canonical labels are what signatures, cache keys and job records use.
pub trait CategoryNormalizer: Send + Sync + Clone {
    fn normalize(&self, raw: &str) -> String;
}
