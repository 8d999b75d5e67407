//! Per-category result cache and per-tuple locks.
//!
//! Each (location, date, category) tuple has two keys: the items under
//! `cache:{location}:{date}:{category}` and a [`CacheEntry`] under the same
//! key with a `:meta` suffix. A hit requires both to be present, readable,
//! non-empty and not past `expire_at`. Anything else is cleared on sight and
//! reported as a miss.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{decode_record, encode_record};
use crate::config::CacheConfig;
use crate::error::AppError;
use crate::job::EventItem;
use crate::signature::normalize_location;
use crate::traits::KvStore;

/// Metadata stored next to a cached result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub expire_at: DateTime<Utc>,
    pub item_count: usize,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}

/// Result of [`CategoryCache::lookup`].
#[derive(Debug, Clone, Default)]
pub struct CacheLookup {
    /// Cached items per category.
    pub hits: HashMap<String, Vec<EventItem>>,
    /// Categories that need a provider call, in request order.
    pub misses: Vec<String>,
    /// Metadata of every hit.
    pub metadata: HashMap<String, CacheEntry>,
}

impl CacheLookup {
    pub fn is_hit(&self, category: &str) -> bool {
        self.hits.contains_key(category)
    }
}

#[derive(Debug, Serialize)]
struct LockRecord {
    acquired_at: DateTime<Utc>,
}

/// Category cache over any [`KvStore`].
#[derive(Debug, Clone)]
pub struct CategoryCache<S: KvStore> {
    store: S,
    config: CacheConfig,
}

impl<S: KvStore> CategoryCache<S> {
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn items_key(location: &str, date: &str, category: &str) -> String {
        format!("cache:{}:{}:{}", normalize_location(location), date, category)
    }

    fn meta_key(location: &str, date: &str, category: &str) -> String {
        format!("{}:meta", Self::items_key(location, date, category))
    }

    fn lock_key(location: &str, date: &str, category: &str) -> String {
        format!("lock:cache:{}:{}:{}", normalize_location(location), date, category)
    }

    /// Checks every category independently.
    pub async fn lookup(
        &self,
        location: &str,
        date: &str,
        categories: &[String],
    ) -> Result<CacheLookup, AppError> {
        let now = Utc::now();
        let mut result = CacheLookup::default();

        for category in categories {
            match self.lookup_one(location, date, category, now).await? {
                Some((items, entry)) => {
                    result.hits.insert(category.clone(), items);
                    result.metadata.insert(category.clone(), entry);
                }
                None => result.misses.push(category.clone()),
            }
        }

        debug!(
            location,
            date,
            hits = result.hits.len(),
            misses = result.misses.len(),
            "Cache lookup"
        );
        Ok(result)
    }

    async fn lookup_one(
        &self,
        location: &str,
        date: &str,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Vec<EventItem>, CacheEntry)>, AppError> {
        let meta_key = Self::meta_key(location, date, category);
        let Some(raw_meta) = self.store.get(&meta_key).await? else {
            return Ok(None);
        };

        let entry = match decode_record::<CacheEntry>(raw_meta) {
            Ok(entry) if !entry.is_expired_at(now) => entry,
            Ok(_) => {
                debug!(category, "Clearing expired cache entry");
                self.clear(location, date, category).await?;
                return Ok(None);
            }
            Err(e) => {
                warn!(category, error = %e, "Clearing unreadable cache metadata");
                self.clear(location, date, category).await?;
                return Ok(None);
            }
        };

        let items_key = Self::items_key(location, date, category);
        let items = match self.store.get(&items_key).await? {
            Some(raw) => match decode_record::<Vec<EventItem>>(raw) {
                Ok(items) => items,
                Err(e) => {
                    warn!(category, error = %e, "Clearing unreadable cache items");
                    self.clear(location, date, category).await?;
                    return Ok(None);
                }
            },
            None => {
                self.clear(location, date, category).await?;
                return Ok(None);
            }
        };

        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some((items, entry)))
    }

    async fn clear(&self, location: &str, date: &str, category: &str) -> Result<(), AppError> {
        self.store
            .delete(&Self::items_key(location, date, category))
            .await?;
        self.store
            .delete(&Self::meta_key(location, date, category))
            .await?;
        Ok(())
    }

    /// Writes a result set and its metadata. `ttl` defaults to the
    /// configured entry TTL.
    pub async fn store(
        &self,
        location: &str,
        date: &str,
        category: &str,
        items: &[EventItem],
        ttl: Option<Duration>,
    ) -> Result<CacheEntry, AppError> {
        let ttl = ttl.unwrap_or(self.config.entry_ttl);
        let cached_at = Utc::now();
        let expire_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| cached_at.checked_add_signed(d))
            .ok_or_else(|| AppError::ConfigError(format!("cache TTL out of range: {ttl:?}")))?;
        let entry = CacheEntry {
            cached_at,
            ttl_seconds: ttl.as_secs(),
            expire_at,
            item_count: items.len(),
        };

        self.store
            .set(
                &Self::items_key(location, date, category),
                encode_record(&items)?,
                Some(ttl),
            )
            .await?;
        self.store
            .set(
                &Self::meta_key(location, date, category),
                encode_record(&entry)?,
                Some(ttl),
            )
            .await?;

        debug!(location, date, category, items = items.len(), "Cached category results");
        Ok(entry)
    }

    /// Takes the per-tuple lock. Returns false if someone else holds it.
    pub async fn acquire_lock(
        &self,
        location: &str,
        date: &str,
        category: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let record = encode_record(&LockRecord {
            acquired_at: Utc::now(),
        })?;
        self.store
            .set_if_absent(&Self::lock_key(location, date, category), record, Some(ttl))
            .await
    }

    /// Takes the per-tuple lock with the configured TTL.
    pub async fn acquire_default_lock(
        &self,
        location: &str,
        date: &str,
        category: &str,
    ) -> Result<bool, AppError> {
        self.acquire_lock(location, date, category, self.config.lock_ttl)
            .await
    }

    pub async fn release_lock(
        &self,
        location: &str,
        date: &str,
        category: &str,
    ) -> Result<bool, AppError> {
        self.store
            .delete(&Self::lock_key(location, date, category))
            .await
    }

    pub async fn is_locked(
        &self,
        location: &str,
        date: &str,
        category: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .store
            .get(&Self::lock_key(location, date, category))
            .await?
            .is_some())
    }
}
