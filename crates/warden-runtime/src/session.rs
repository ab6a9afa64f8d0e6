use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_policy::{ModeState, OperationWindow, TrustLedger};

/// Store key prefix for session records.
pub const KEY_PREFIX: &str = "session:";

pub fn store_key(identity: &str) -> String {
    format!("{KEY_PREFIX}{identity}")
}

/// Everything Warden remembers about one identity, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub identity: String,
    pub ledger: TrustLedger,
    pub mode: ModeState,
    pub window: OperationWindow,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Seconds since the last evaluation; zero for a session that has none.
    pub fn idle_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.last_activity
            .map(|t| u64::try_from((now - t).num_seconds()).unwrap_or(0))
            .unwrap_or(0)
    }
}

/// A live session. `persistent` turns false once the store has failed; the
/// session then runs on its in-memory state until the process exits.
#[derive(Debug)]
pub struct Session {
    pub record: SessionRecord,
    pub persistent: bool,
}
