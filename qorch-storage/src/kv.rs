//! Opaque key/value storage with TTL.
//!
//! `Context Store` and the Deep-Research Workflow both degrade to an
//! in-process cache when the configured durable backend is unavailable; see
//! `qorch_context::ContextStore` for the degrade-and-warn-once policy. This
//! module only provides the backend trait and two implementations: an
//! in-memory map for tests and local runs, and a SQLite-backed store behind
//! the `sqlite` feature (the one concrete durable backend the specification
//! names).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use qorch_core::Result;

/// A durable (or in-memory) opaque key/value store with per-key TTL.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys whose name contains `pattern` as a substring (a simplified
    /// stand-in for the glob-style pattern matching the specification's
    /// `list_sessions(pattern)` describes).
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Refreshes a key's expiry to `now + ttl` without touching its value.
    /// A no-op if the key is absent.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<()>;
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| epoch_secs() >= at)
    }
}

/// Process-local, non-persistent `KvBackend`. Used directly in tests and as
/// the fallback when a durable backend is configured but unreachable.
#[derive(Default)]
pub struct InMemoryKv {
    entries: DashMap<String, Entry>,
}

impl InMemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| epoch_secs() + d.as_secs());
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|kv| !kv.value().is_expired() && kv.key().contains(pattern))
            .map(|kv| kv.key().clone())
            .collect())
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(epoch_secs() + ttl.as_secs());
        }
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite_backend::SqliteKv;

#[cfg(feature = "sqlite")]
mod sqlite_backend {
    use super::{epoch_secs, KvBackend};
    use async_trait::async_trait;
    use qorch_core::{Error, Result};
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;
    use rusqlite::OptionalExtension;
    use std::time::Duration;

    /// SQLite-backed `KvBackend` using a pooled connection manager, per the
    /// teacher workspace's `r2d2`/`rusqlite` durable-store pattern.
    pub struct SqliteKv {
        pool: Pool<SqliteConnectionManager>,
    }

    impl SqliteKv {
        /// Opens (creating if absent) a SQLite database at `path` and
        /// ensures the `kv_store` table exists.
        pub fn open(path: &str) -> Result<Self> {
            let manager = SqliteConnectionManager::file(path);
            let pool = Pool::new(manager)
                .map_err(|e| Error::storage(format!("failed to open sqlite pool: {e}")))?;
            let conn = pool
                .get()
                .map_err(|e| Error::storage(format!("failed to get sqlite connection: {e}")))?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL,
                    expires_at INTEGER
                )",
                [],
            )
            .map_err(|e| Error::storage(format!("failed to create kv_store table: {e}")))?;
            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl KvBackend for SqliteKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let pool = self.pool.clone();
            let key = key.to_string();
            tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| Error::storage(format!("sqlite pool error: {e}")))?;
                let row: Option<(Vec<u8>, Option<i64>)> = conn
                    .query_row(
                        "SELECT value, expires_at FROM kv_store WHERE key = ?1",
                        [&key],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()
                    .map_err(|e| Error::storage(format!("sqlite query error: {e}")))?;
                match row {
                    Some((_value, Some(expires_at)))
                        if u64::try_from(expires_at).unwrap_or(0) <= epoch_secs() =>
                    {
                        conn.execute("DELETE FROM kv_store WHERE key = ?1", [&key])
                            .map_err(|e| Error::storage(format!("sqlite delete error: {e}")))?;
                        Ok(None)
                    }
                    Some((value, _)) => Ok(Some(value)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| Error::storage(format!("sqlite task join error: {e}")))?
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
            let pool = self.pool.clone();
            let key = key.to_string();
            let expires_at = ttl.map(|d| (epoch_secs() + d.as_secs()) as i64);
            tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| Error::storage(format!("sqlite pool error: {e}")))?;
                conn.execute(
                    "INSERT INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                    rusqlite::params![key, value, expires_at],
                )
                .map_err(|e| Error::storage(format!("sqlite upsert error: {e}")))?;
                Ok(())
            })
            .await
            .map_err(|e| Error::storage(format!("sqlite task join error: {e}")))?
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let pool = self.pool.clone();
            let key = key.to_string();
            tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| Error::storage(format!("sqlite pool error: {e}")))?;
                conn.execute("DELETE FROM kv_store WHERE key = ?1", [&key])
                    .map_err(|e| Error::storage(format!("sqlite delete error: {e}")))?;
                Ok(())
            })
            .await
            .map_err(|e| Error::storage(format!("sqlite task join error: {e}")))?
        }

        async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
            let pool = self.pool.clone();
            let like = format!("%{pattern}%");
            tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| Error::storage(format!("sqlite pool error: {e}")))?;
                let now = epoch_secs() as i64;
                let mut stmt = conn
                    .prepare(
                        "SELECT key FROM kv_store WHERE key LIKE ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    )
                    .map_err(|e| Error::storage(format!("sqlite prepare error: {e}")))?;
                let keys = stmt
                    .query_map(rusqlite::params![like, now], |r| r.get(0))
                    .map_err(|e| Error::storage(format!("sqlite query error: {e}")))?
                    .collect::<rusqlite::Result<Vec<String>>>()
                    .map_err(|e| Error::storage(format!("sqlite row error: {e}")))?;
                Ok(keys)
            })
            .await
            .map_err(|e| Error::storage(format!("sqlite task join error: {e}")))?
        }

        async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
            let pool = self.pool.clone();
            let key = key.to_string();
            let expires_at = (epoch_secs() + ttl.as_secs()) as i64;
            tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| Error::storage(format!("sqlite pool error: {e}")))?;
                conn.execute(
                    "UPDATE kv_store SET expires_at = ?1 WHERE key = ?2",
                    rusqlite::params![expires_at, key],
                )
                .map_err(|e| Error::storage(format!("sqlite update error: {e}")))?;
                Ok(())
            })
            .await
            .map_err(|e| Error::storage(format!("sqlite task join error: {e}")))?
        }
    }
}
