use chrono::{DateTime, Utc};

use warden_core::{Result, WardenError};
use warden_store::KvStore;

/// Stands in for a store that could not be opened. Every call fails, so
/// sessions fall back to memory and checkpoints are refused.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(WardenError::PersistentStoreUnavailable(self.reason.clone()))
    }
}

impl KvStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        self.fail()
    }

    fn put(&self, _key: &str, _value: &str, _expires_at: Option<DateTime<Utc>>) -> Result<()> {
        self.fail()
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        self.fail()
    }

    fn keys(&self, _prefix: &str) -> Result<Vec<String>> {
        self.fail()
    }

    fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        self.fail()
    }
}
