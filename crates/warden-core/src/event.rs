use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::decision::{Action, ModeKind};

/// Events emitted by the engine, for audit sinks and host UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Decisions ──────────────────────────────────────────────
    DecisionMade {
        identity: String,
        operation: String,
        score: u8,
        action: Action,
        timestamp: DateTime<Utc>,
    },
    OutcomeReported {
        identity: String,
        pattern: String,
        approved: bool,
        was_mistake: bool,
    },

    // ── Trust / mode lifecycle ─────────────────────────────────
    TrustReset {
        identity: String,
        reason: String,
    },
    PatternAutoTrusted {
        identity: String,
        pattern: String,
    },
    ModeChanged {
        identity: String,
        from: ModeKind,
        to: ModeKind,
    },

    // ── Recovery lifecycle ─────────────────────────────────────
    CheckpointCreated {
        checkpoint_id: Uuid,
        strategy: String,
        expires_at: DateTime<Utc>,
    },
    CheckpointRestored {
        checkpoint_id: Uuid,
    },

    // ── Degradation ────────────────────────────────────────────
    StoreUnavailable {
        identity: String,
        error: String,
    },
}

/// A broadcast-based event bus for engine-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
