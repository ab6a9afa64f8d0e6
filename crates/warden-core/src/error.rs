use thiserror::Error;

/// Unified error type for the entire Warden engine.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Input errors ───────────────────────────────────────────
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    // ── Context errors ─────────────────────────────────────────
    #[error("context probe unavailable: {probe}: {reason}")]
    ProbeUnavailable { probe: String, reason: String },

    // ── Recovery errors ────────────────────────────────────────
    #[error("no recovery strategy for {kind} operation: {detail}")]
    UnsupportedOperationKind { kind: String, detail: String },

    #[error("checkpoint expired: {0}")]
    CheckpointExpired(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("checkpoint creation failed: {0}")]
    CheckpointFailed(String),

    #[error("restore failed: {checkpoint}: {reason}")]
    RestoreFailed { checkpoint: String, reason: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("persistent store unavailable: {0}")]
    PersistentStoreUnavailable(String),

    // ── Mode errors ────────────────────────────────────────────
    #[error("invalid mode transition: {from} -> {to}")]
    InvalidModeTransition { from: String, to: String },

    // ── Rule / config errors ───────────────────────────────────
    #[error("rule book error: {0}")]
    RuleBook(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Whether the caller must refuse to execute the operation.
    ///
    /// Context and store failures are absorbed by the engine; only malformed
    /// input aborts an evaluation.
    pub fn is_fatal_for_evaluation(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
