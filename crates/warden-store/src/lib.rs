//! # warden-store
//!
//! Key-value persistence behind the [`KvStore`] trait. Session records and
//! recovery payloads are stored as opaque strings with an optional expiry.
//!
//! Two implementations ship with the crate: [`SqliteStore`] for on-disk
//! state and [`MemoryStore`] for tests and `--in-memory` runs.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use warden_core::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Minimal key-value contract the engine needs from its storage backend.
///
/// Implementations must be safe to share across threads. Expired entries
/// are still returned by [`get`](KvStore::get) until purged; callers that
/// care about expiry check it themselves.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    fn put(&self, key: &str, value: &str, expires_at: Option<DateTime<Utc>>) -> Result<()>;

    /// Remove a key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Drop every entry whose expiry is at or before `now`. Returns the count removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
