use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use warden_core::{Result, WardenError};

use crate::KvStore;

fn store_err(e: rusqlite::Error) -> WardenError {
    WardenError::PersistentStoreUnavailable(e.to_string())
}

/// SQLite-backed [`KvStore`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening warden store");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| WardenError::PersistentStoreUnavailable(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(store_err)?;

        // Enable WAL mode for concurrent readers (CLI invocations in parallel)
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;

        // expires_at holds unix milliseconds.
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
            ",
        )
        .map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        db.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)
    }

    fn put(&self, key: &str, value: &str, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock();
        db.execute(
            "INSERT INTO kv (key, value, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            rusqlite::params![key, value, expires_at.map(|t| t.timestamp_millis()), now],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let db = self.db.lock();
        let removed = db
            .execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(rusqlite::params![prefix], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = self.db.lock();
        let removed = db
            .execute(
                "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                rusqlite::params![now.timestamp_millis()],
            )
            .map_err(store_err)?;
        if removed > 0 {
            debug!(removed, "purged expired entries");
        }
        Ok(removed)
    }
}
