//! Key-value store for PostgreSQL with SELECT FOR UPDATE SKIP LOCKED.
//!
//! Keys live in `scout_kv` with an optional `expires_at`; expired rows are
//! invisible to every read and are reclaimed by [`PgStore::purge_expired`].
//! Queues live in `scout_queue`, ordered by a serial id, and are popped with
//! row-level locking so concurrent runners never receive the same member.

use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use tracing::{debug, info};

use scout_core::error::AppError;
use scout_core::traits::KvStore;

/// Schema statements, executed one by one by [`PgStore::migrate`].
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS scout_kv (
        key TEXT PRIMARY KEY,
        value JSONB NOT NULL,
        expires_at TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_scout_kv_expires_at ON scout_kv(expires_at) WHERE expires_at IS NOT NULL",
    r#"CREATE TABLE IF NOT EXISTS scout_queue (
        id BIGSERIAL PRIMARY KEY,
        queue TEXT NOT NULL,
        member TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_scout_queue_queue_id ON scout_queue(queue, id)",
];

fn db_error(e: sqlx::Error) -> AppError {
    AppError::StorageError(e.to_string())
}

/// Longest TTL written to the database, about 100 years.
const MAX_TTL_MILLIS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// TTL as whole milliseconds for `NOW() + $n * INTERVAL '1 millisecond'`.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis())
        .unwrap_or(i64::MAX)
        .min(MAX_TTL_MILLIS)
}

/// PostgreSQL implementation of [`KvStore`].
///
/// # Examples
///
/// ```no_run
/// use scout_db::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgStore::connect("postgresql://localhost/scout", 5).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_error)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        info!("Storage schema ready");
        Ok(())
    }

    /// Deletes expired keys. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM scout_kv WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "Purged expired keys");
        }
        Ok(purged)
    }
}

// =============================================================================
// KvStore Trait Implementation
// =============================================================================

impl KvStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        sqlx::query_scalar(
            r#"
            SELECT value FROM scout_kv
            WHERE key = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO scout_kv (key, value, expires_at)
            VALUES ($1, $2, NOW() + $3::BIGINT * INTERVAL '1 millisecond')
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(ttl_millis))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, AppError> {
        // An expired row counts as absent and is taken over in place.
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO scout_kv (key, value, expires_at)
            VALUES ($1, $2, NOW() + $3::BIGINT * INTERVAL '1 millisecond')
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            WHERE scout_kv.expires_at IS NOT NULL AND scout_kv.expires_at <= NOW()
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(ttl_millis))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(claimed.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let live: Option<bool> = sqlx::query_scalar(
            r#"
            DELETE FROM scout_kv
            WHERE key = $1
            RETURNING (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(live.unwrap_or(false))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE scout_kv
            SET expires_at = NOW() + $2::BIGINT * INTERVAL '1 millisecond'
            WHERE key = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .bind(ttl_millis(ttl))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_if_eq(&self, key: &str, expected: &Value) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM scout_kv
            WHERE key = $1
              AND value = $2
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn expire_if_eq(
        &self,
        key: &str,
        expected: &Value,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE scout_kv
            SET expires_at = NOW() + $3::BIGINT * INTERVAL '1 millisecond'
            WHERE key = $1
              AND value = $2
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .bind(expected)
        .bind(ttl_millis(ttl))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn push(&self, queue: &str, member: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO scout_queue (queue, member) VALUES ($1, $2)")
            .bind(queue)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar(
            r#"
            DELETE FROM scout_queue
            WHERE id = (
                SELECT id FROM scout_queue
                WHERE queue = $1
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING member
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn queue_len(&self, queue: &str) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scout_queue WHERE queue = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
