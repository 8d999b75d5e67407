//! In-process [`KvStore`] implementation.
//!
//! Used by tests and by single-process deployments (`--store memory`).
//! Expired keys are dropped when they are next touched, and in bulk by
//! [`MemoryStore::purge_expired`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppError;
use crate::traits::KvStore;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    queues: HashMap<String, VecDeque<String>>,
}

impl Inner {
    fn live_entry(&mut self, key: &str, now: DateTime<Utc>) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// Absolute expiry for `ttl`; a TTL past the representable range never expires.
fn expiry(ttl: Option<Duration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ttl.and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|d| now.checked_add_signed(d))
}

/// Thread-safe in-memory key-value store with TTLs and FIFO queues.
///
/// Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::StorageError("memory store mutex poisoned".to_string()))
    }

    /// Number of live keys, excluding queues.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.inner
            .lock()
            .map(|inner| inner.entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired key and returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - inner.entries.len())
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        Ok(inner.live_entry(key, now).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: expiry(ttl, now),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        if inner.live_entry(key, now).is_some() {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: expiry(ttl, now),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        Ok(inner
            .entries
            .remove(key)
            .is_some_and(|e| !e.is_expired(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        match inner.live_entry(key, now) {
            Some(entry) => {
                entry.expires_at = expiry(Some(ttl), now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_if_eq(&self, key: &str, expected: &Value) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        if !inner
            .live_entry(key, now)
            .is_some_and(|e| &e.value == expected)
        {
            return Ok(false);
        }
        Ok(inner.entries.remove(key).is_some())
    }

    async fn expire_if_eq(
        &self,
        key: &str,
        expected: &Value,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        match inner.live_entry(key, now) {
            Some(entry) if &entry.value == expected => {
                entry.expires_at = expiry(Some(ttl), now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn push(&self, queue: &str, member: &str) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(member.to_string());
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, AppError> {
        let mut inner = self.lock()?;
        Ok(inner.queues.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn queue_len(&self, queue: &str) -> Result<u64, AppError> {
        let inner = self.lock()?;
        Ok(inner.queues.get(queue).map_or(0, |q| q.len() as u64))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}
