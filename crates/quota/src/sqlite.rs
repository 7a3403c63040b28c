//! SQLite-backed quota store.
//!
//! One table, `quota_balances(key, value, expires_at)`, with `expires_at` in
//! Unix milliseconds. Each [`QuotaStore`] primitive is a single statement, so
//! SQLite's write lock makes it atomic across connections and processes.
//! Expired rows are ignored on read and overwritten on write;
//! [`SqliteQuotaStore::purge_expired`] reclaims them.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lingoclaw_core::error::QuotaError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::store::QuotaStore;

/// A durable [`QuotaStore`] on SQLite.
pub struct SqliteQuotaStore {
    pool: SqlitePool,
}

fn store_err(context: &str) -> impl Fn(sqlx::Error) -> QuotaError + '_ {
    move |e| QuotaError::Store(format!("{context}: {e}"))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(ttl: Duration) -> i64 {
    now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

impl SqliteQuotaStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, QuotaError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| QuotaError::Store(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        // An in-memory database exists per connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(store_err("Failed to open SQLite"))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite quota store initialized at {path}");
        Ok(store)
    }

    /// Wrap an existing pool and make sure the schema exists.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, QuotaError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), QuotaError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quota_balances (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err("quota_balances table"))?;
        Ok(())
    }

    /// Store an arbitrary string, bypassing integer formatting.
    pub async fn insert_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), QuotaError> {
        sqlx::query(
            "INSERT INTO quota_balances (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expiry_ms(ttl))
        .execute(&self.pool)
        .await
        .map_err(store_err("insert"))?;
        Ok(())
    }

    /// Delete expired rows. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, QuotaError> {
        let result = sqlx::query("DELETE FROM quota_balances WHERE expires_at <= ?1")
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(store_err("purge"))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn get(&self, key: &str) -> Result<Option<String>, QuotaError> {
        let row = sqlx::query("SELECT value FROM quota_balances WHERE key = ?1 AND expires_at > ?2")
            .bind(key)
            .bind(now_ms())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("get"))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), QuotaError> {
        self.insert_raw(key, &value.to_string(), ttl).await
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, QuotaError> {
        let result = sqlx::query(
            "INSERT INTO quota_balances (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
             WHERE quota_balances.expires_at <= ?4",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(expiry_ms(ttl))
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(store_err("set if absent"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn init_or_decrement(
        &self,
        key: &str,
        initial: i64,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, QuotaError> {
        // A row is replaced when it has expired or does not hold a canonical
        // integer; otherwise it is decremented in place with its TTL kept.
        let row = sqlx::query(
            r#"
            INSERT INTO quota_balances (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN quota_balances.expires_at <= ?4
                      OR CAST(CAST(quota_balances.value AS INTEGER) AS TEXT) <> quota_balances.value
                    THEN excluded.value
                    ELSE CAST(CAST(quota_balances.value AS INTEGER) - ?5 AS TEXT)
                END,
                expires_at = CASE
                    WHEN quota_balances.expires_at <= ?4
                      OR CAST(CAST(quota_balances.value AS INTEGER) AS TEXT) <> quota_balances.value
                    THEN excluded.expires_at
                    ELSE quota_balances.expires_at
                END
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(initial.to_string())
        .bind(expiry_ms(ttl))
        .bind(now_ms())
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err("init or decrement"))?;

        let value: String = row.get("value");
        value
            .parse()
            .map_err(|_| QuotaError::Store(format!("non-integer balance '{value}' after update")))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, QuotaError> {
        let now = now_ms();
        let row = sqlx::query("SELECT expires_at FROM quota_balances WHERE key = ?1 AND expires_at > ?2")
            .bind(key)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("ttl"))?;
        Ok(row.map(|r| {
            let expires_at: i64 = r.get("expires_at");
            Duration::from_millis(u64::try_from(expires_at - now).unwrap_or(0))
        }))
    }
}
