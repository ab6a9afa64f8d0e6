//! Checkpoint records and their stored payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{CheckpointId, Operation, Result, WardenError};

use crate::fs::FileEntry;
use crate::git::RefCapture;

/// Store key prefix for checkpoint records.
pub const KEY_PREFIX: &str = "checkpoint:";

pub fn store_key(id: &CheckpointId) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// How a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Contents of files about to be deleted.
    FileArchive,
    /// Git HEAD and branch pointers, like a reflog entry.
    GitRefPointer,
    /// A copy of files about to be modified in place.
    ConfigCopy,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileArchive => "file_archive",
            Self::GitRefPointer => "git_ref_pointer",
            Self::ConfigCopy => "config_copy",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file_archive" => Ok(Self::FileArchive),
            "git_ref_pointer" => Ok(Self::GitRefPointer),
            "config_copy" => Ok(Self::ConfigCopy),
            other => Err(WardenError::Other(anyhow::anyhow!("unknown strategy '{other}'"))),
        }
    }
}

/// A restorable snapshot taken before an operation ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryCheckpoint {
    pub id: CheckpointId,
    pub operation: Operation,
    /// Human-readable description of what was captured.
    pub backup_ref: String,
    pub strategy: StrategyKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RecoveryCheckpoint {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Captured state, enough to undo the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Files { entries: Vec<FileEntry> },
    GitRefs(RefCapture),
}

impl Payload {
    /// Put the captured state back.
    pub fn restore(&self) -> std::io::Result<()> {
        match self {
            Self::Files { entries } => crate::fs::restore_entries(entries),
            Self::GitRefs(capture) => capture.restore(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Files { entries } => {
                let bytes: usize = entries.iter().map(FileEntry::size).sum();
                format!("{} entries, {} bytes", entries.len(), bytes)
            }
            Self::GitRefs(capture) => capture.describe(),
        }
    }
}

/// What goes into the store under [`store_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredCheckpoint {
    pub checkpoint: RecoveryCheckpoint,
    pub payload: Payload,
}
