//! SQLite-backed store
//!
//! A single `kv` table in WAL mode. Each row carries its last write time so
//! cache namespaces can be pruned. rusqlite is blocking, so every call runs
//! on the blocking pool with the connection behind a std mutex.

use super::KvStore;
use crate::error::{RelayError, RelayResult};
use crate::logging::log_info;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|e| RelayError::storage(format!("Failed to open {}: {e}", path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| RelayError::storage(e.to_string()))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| RelayError::storage(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| RelayError::storage(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (\
                key TEXT PRIMARY KEY, \
                value TEXT NOT NULL, \
                updated_at INTEGER NOT NULL DEFAULT 0)",
            [],
        )
        .map_err(|e| RelayError::storage(format!("Failed to create kv table: {e}")))?;
        migrate_updated_at(&conn)
            .map_err(|e| RelayError::storage(format!("Failed to migrate kv table: {e}")))?;

        log_info!(path = %path.display(), "Credential store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, op: F) -> RelayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RelayError::storage("store connection lock poisoned"))?;
            op(&guard).map_err(|e| RelayError::storage(e.to_string()))
        })
        .await
        .map_err(|e| RelayError::storage(format!("store task failed: {e}")))?
    }
}

/// Stores created before write stamps existed lack the column.
fn migrate_updated_at(conn: &Connection) -> rusqlite::Result<()> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('kv') WHERE name = 'updated_at'",
        [],
        |row| row.get(0),
    )?;
    if present == 0 {
        conn.execute(
            "ALTER TABLE kv ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS kv_updated_at ON kv (updated_at)",
        [],
    )?;
    Ok(())
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> RelayResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
    }

    async fn put(&self, key: &str, value: String) -> RelayResult<()> {
        let key = key.to_string();
        let now = chrono::Utc::now().timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO UPDATE SET \
                 value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> RelayResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map(|_| ())
        })
        .await
    }

    async fn prune(&self, prefix: &str, written_before: i64) -> RelayResult<usize> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM kv WHERE updated_at <= ?2 AND substr(key, 1, length(?1)) = ?1",
                params![prefix, written_before],
            )
        })
        .await
    }
}
