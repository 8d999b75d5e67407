//! Runtime selection of the storage backend.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use scout_core::error::AppError;
use scout_core::memory::MemoryStore;
use scout_core::traits::KvStore;

use crate::pg_store::PgStore;

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreKind {
    /// PostgreSQL via `DATABASE_URL`.
    #[default]
    Postgres,
    /// Process-local memory. Nothing survives a restart.
    Memory,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Postgres => "postgres",
            StoreKind::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(format!(
                "unknown store '{other}', expected 'postgres' or 'memory'"
            )),
        }
    }
}

/// A [`KvStore`] chosen at startup.
#[derive(Clone)]
pub enum StoreBackend {
    Postgres(PgStore),
    Memory(MemoryStore),
}

impl StoreBackend {
    /// Opens the selected backend. PostgreSQL connections are migrated
    /// before they are returned.
    pub async fn open(
        kind: StoreKind,
        database_url: Option<&str>,
        max_connections: u32,
    ) -> Result<Self, AppError> {
        match kind {
            StoreKind::Postgres => {
                let url = database_url.ok_or_else(|| {
                    AppError::ConfigError("DATABASE_URL is required for the postgres store".into())
                })?;
                let store = PgStore::connect(url, max_connections).await?;
                store.migrate().await?;
                Ok(StoreBackend::Postgres(store))
            }
            StoreKind::Memory => {
                warn!("Using in-memory store, jobs will not survive a restart");
                Ok(StoreBackend::Memory(MemoryStore::new()))
            }
        }
    }

    pub fn kind(&self) -> StoreKind {
        match self {
            StoreBackend::Postgres(_) => StoreKind::Postgres,
            StoreBackend::Memory(_) => StoreKind::Memory,
        }
    }

    /// Reclaims expired keys that nothing has read since they lapsed.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        match self {
            StoreBackend::Postgres(store) => store.purge_expired().await,
            StoreBackend::Memory(store) => {
                let purged = store.purge_expired()?;
                Ok(u64::try_from(purged).unwrap_or(u64::MAX))
            }
        }
    }
}

impl KvStore for StoreBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.get(key).await,
            StoreBackend::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), AppError> {
        match self {
            StoreBackend::Postgres(s) => s.set(key, value, ttl).await,
            StoreBackend::Memory(s) => s.set(key, value, ttl).await,
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.set_if_absent(key, value, ttl).await,
            StoreBackend::Memory(s) => s.set_if_absent(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.delete(key).await,
            StoreBackend::Memory(s) => s.delete(key).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.expire(key, ttl).await,
            StoreBackend::Memory(s) => s.expire(key, ttl).await,
        }
    }

    async fn delete_if_eq(&self, key: &str, expected: &Value) -> Result<bool, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.delete_if_eq(key, expected).await,
            StoreBackend::Memory(s) => s.delete_if_eq(key, expected).await,
        }
    }

    async fn expire_if_eq(
        &self,
        key: &str,
        expected: &Value,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.expire_if_eq(key, expected, ttl).await,
            StoreBackend::Memory(s) => s.expire_if_eq(key, expected, ttl).await,
        }
    }

    async fn push(&self, queue: &str, member: &str) -> Result<(), AppError> {
        match self {
            StoreBackend::Postgres(s) => s.push(queue, member).await,
            StoreBackend::Memory(s) => s.push(queue, member).await,
        }
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.pop(queue).await,
            StoreBackend::Memory(s) => s.pop(queue).await,
        }
    }

    async fn queue_len(&self, queue: &str) -> Result<u64, AppError> {
        match self {
            StoreBackend::Postgres(s) => s.queue_len(queue).await,
            StoreBackend::Memory(s) => s.queue_len(queue).await,
        }
    }

    async fn health_check(&self) -> Result<(), AppError> {
        match self {
            StoreBackend::Postgres(s) => s.health_check().await,
            StoreBackend::Memory(s) => s.health_check().await,
        }
    }
}
