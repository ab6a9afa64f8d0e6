use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_config::RecoveryConfig;
use warden_core::{CheckpointId, Operation, Recoverability, Result, WardenError, after_secs};
use warden_store::KvStore;

use crate::checkpoint::{KEY_PREFIX, RecoveryCheckpoint, StoredCheckpoint, store_key};
use crate::strategy::{CheckpointStrategy, default_strategies};

/// Creates, restores and expires recovery checkpoints.
///
/// Checkpoints live in the shared [`KvStore`] with an expiry; expiry is
/// checked when a restore is attempted and by [`purge_expired`](Self::purge_expired).
pub struct RecoveryCoordinator {
    store: Arc<dyn KvStore>,
    config: RecoveryConfig,
    strategies: Vec<Box<dyn CheckpointStrategy>>,
}

impl RecoveryCoordinator {
    pub fn new(store: Arc<dyn KvStore>, config: RecoveryConfig) -> Self {
        Self {
            store,
            config,
            strategies: default_strategies(),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    fn strategy_for(&self, operation: &Operation) -> Option<&dyn CheckpointStrategy> {
        self.strategies
            .iter()
            .find(|s| s.applies(operation))
            .map(|s| s.as_ref())
    }

    pub fn checkpoint(&self, operation: &Operation, cwd: &Path) -> Result<RecoveryCheckpoint> {
        self.checkpoint_at(operation, cwd, Utc::now())
    }

    /// Capture state for `operation` before it runs.
    pub fn checkpoint_at(
        &self,
        operation: &Operation,
        cwd: &Path,
        now: DateTime<Utc>,
    ) -> Result<RecoveryCheckpoint> {
        let strategy = self.strategy_for(operation).ok_or_else(|| {
            WardenError::UnsupportedOperationKind {
                kind: operation.kind.to_string(),
                detail: operation.raw_text.clone(),
            }
        })?;

        let payload = strategy
            .capture(operation, cwd, self.config.max_archive_bytes)
            .inspect_err(|e| warn!(strategy = %strategy.kind(), error = %e, "checkpoint capture failed"))?;

        let checkpoint = RecoveryCheckpoint {
            id: Uuid::new_v4(),
            operation: operation.clone(),
            backup_ref: payload.describe(),
            strategy: strategy.kind(),
            created_at: now,
            expires_at: after_secs(now, self.config.retention_secs),
        };

        let record = StoredCheckpoint {
            checkpoint: checkpoint.clone(),
            payload,
        };
        let raw = serde_json::to_string(&record)?;
        self.store
            .put(&store_key(&checkpoint.id), &raw, Some(checkpoint.expires_at))
            .map_err(|e| WardenError::CheckpointFailed(format!("cannot persist checkpoint: {e}")))?;

        info!(
            checkpoint_id = %checkpoint.id,
            strategy = %checkpoint.strategy,
            backup = %checkpoint.backup_ref,
            "checkpoint created"
        );
        Ok(checkpoint)
    }

    pub fn restore(&self, id: &CheckpointId) -> Result<RecoveryCheckpoint> {
        self.restore_at(id, Utc::now())
    }

    /// Undo the checkpointed operation. A restored checkpoint is consumed.
    pub fn restore_at(&self, id: &CheckpointId, now: DateTime<Utc>) -> Result<RecoveryCheckpoint> {
        let key = store_key(id);
        let record = self.load(&key)?;

        if record.checkpoint.is_expired(now) {
            self.store.delete(&key)?;
            info!(checkpoint_id = %id, "checkpoint expired");
            return Err(WardenError::CheckpointExpired(id.to_string()));
        }

        record
            .payload
            .restore()
            .map_err(|e| WardenError::RestoreFailed {
                checkpoint: id.to_string(),
                reason: e.to_string(),
            })?;

        self.store.delete(&key)?;
        info!(checkpoint_id = %id, strategy = %record.checkpoint.strategy, "checkpoint restored");
        Ok(record.checkpoint)
    }

    /// A checkpoint by id, expired or not.
    pub fn get(&self, id: &CheckpointId) -> Result<Option<RecoveryCheckpoint>> {
        match self.load(&store_key(id)) {
            Ok(record) => Ok(Some(record.checkpoint)),
            Err(WardenError::CheckpointNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every stored checkpoint, oldest first.
    pub fn list(&self) -> Result<Vec<RecoveryCheckpoint>> {
        let mut out = Vec::new();
        for key in self.store.keys(KEY_PREFIX)? {
            match self.load(&key) {
                Ok(record) => out.push(record.checkpoint),
                Err(e) => debug!(%key, error = %e, "skipping unreadable checkpoint"),
            }
        }
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.purge_expired(now)?;
        if removed > 0 {
            info!(removed, "expired checkpoints purged");
        }
        Ok(removed)
    }

    fn load(&self, key: &str) -> Result<StoredCheckpoint> {
        let raw = self
            .store
            .get(key)?
            .ok_or_else(|| WardenError::CheckpointNotFound(key.trim_start_matches(KEY_PREFIX).to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Recoverability for RecoveryCoordinator {
    fn supports(&self, operation: &Operation) -> bool {
        self.strategy_for(operation).is_some()
    }
}
