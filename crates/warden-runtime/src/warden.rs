//! The Warden decision API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use warden_config::WardenConfig;
use warden_core::{
    Action, CheckpointId, Decision, Event, EventBus, Operation, Result, WardenError,
};
use warden_policy::{
    ContextProbe, ModeController, ModeState, ModeTransition, OperationWindow, PolicyEngine,
    ProbeFact, ProbeResults, RiskAdvisor, RuleBook, SnapshotBuilder, TrustInfo, TrustLedger,
    TrustPolicy, gather, pattern_key,
};
use warden_recovery::{RecoveryCheckpoint, RecoveryCoordinator};
use warden_store::{KvStore, MemoryStore, SqliteStore};

use crate::fallback::UnavailableStore;
use crate::probes::system_probes;
use crate::session::{Session, SessionRecord, store_key};

/// Reason attached to decisions made while session state cannot be saved.
pub const STORE_UNAVAILABLE_REASON: &str = "persistent store unavailable";

/// Result of asking whether an evaluated operation may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Authorization {
    /// Go ahead. `checkpoint` is set when the operation can be undone.
    Proceed {
        checkpoint: Option<RecoveryCheckpoint>,
    },
    /// Go ahead, but nothing was captured to undo it.
    ProceedAtOwnRisk { reason: String },
    Denied { reason: String },
}

impl Authorization {
    pub fn may_proceed(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }

    pub fn checkpoint(&self) -> Option<&RecoveryCheckpoint> {
        match self {
            Self::Proceed { checkpoint } => checkpoint.as_ref(),
            _ => None,
        }
    }
}

/// Owns configuration, the rule book, storage, probes and the event bus,
/// and keeps one session per identity.
///
/// Identities evaluate concurrently; calls for the same identity are
/// serialised by that session's lock.
pub struct Warden {
    config: WardenConfig,
    engine: PolicyEngine,
    store: Arc<dyn KvStore>,
    recovery: Arc<RecoveryCoordinator>,
    probes: Vec<Arc<dyn ContextProbe>>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    events: EventBus,
    working_dir: PathBuf,
}

impl Warden {
    pub fn new(config: WardenConfig, book: Arc<RuleBook>, store: Arc<dyn KvStore>) -> Self {
        let recovery = Arc::new(RecoveryCoordinator::new(
            store.clone(),
            config.recovery.clone(),
        ));
        let engine =
            PolicyEngine::from_config(&config, book).with_recoverability(recovery.clone());
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self {
            probes: system_probes(&working_dir),
            config,
            engine,
            store,
            recovery,
            sessions: DashMap::new(),
            events: EventBus::default(),
            working_dir,
        }
    }

    /// Load the rule book and open the store the configuration names.
    ///
    /// A store that cannot be opened does not stop startup; every session
    /// then runs in memory and says so in its decisions.
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        let book = Arc::new(RuleBook::load(&config.rules)?);
        let store: Arc<dyn KvStore> = if config.store.in_memory {
            Arc::new(MemoryStore::new())
        } else {
            match SqliteStore::open(&config.store.db_path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(path = %config.store.db_path.display(), error = %e, "store unavailable, running in memory");
                    Arc::new(UnavailableStore::new(e.to_string()))
                }
            }
        };
        Ok(Self::new(config, book, store))
    }

    /// Replace the probe set, e.g. with fixed probes in tests.
    #[must_use]
    pub fn with_probes(mut self, probes: Vec<Arc<dyn ContextProbe>>) -> Self {
        self.probes = probes;
        self
    }

    /// Directory checkpoints resolve against when a session has not
    /// recorded one. Does not change the probes.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn RiskAdvisor>) -> Self {
        self.engine = self.engine.with_advisor(advisor);
        self
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn rule_book(&self) -> &RuleBook {
        self.engine.rule_book()
    }

    pub fn recovery(&self) -> &RecoveryCoordinator {
        &self.recovery
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ── Decisions ──────────────────────────────────────────────

    /// Run every probe once, each bounded by `engine.probe_timeout_ms`.
    pub async fn probe(&self) -> ProbeResults {
        let timeout = Duration::from_millis(self.config.engine.probe_timeout_ms);
        gather(&self.probes, timeout).await
    }

    /// Gather context from the probes, then decide.
    pub async fn evaluate(&self, identity: &str, operation: &Operation) -> Result<Decision> {
        operation.validate()?;
        let results = self.probe().await;
        self.evaluate_with(identity, operation, results)
    }

    /// Decide using probe results the caller already has.
    pub fn evaluate_with(
        &self,
        identity: &str,
        operation: &Operation,
        results: ProbeResults,
    ) -> Result<Decision> {
        self.evaluate_at(identity, operation, results, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        identity: &str,
        operation: &Operation,
        mut results: ProbeResults,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        operation.validate()?;
        let handle = self.session(identity, now);
        let mut guard = handle.lock();
        let session = &mut *guard;

        if !results.has(|f| matches!(f, ProbeFact::IdleSeconds(_))) {
            results.push(ProbeFact::IdleSeconds(session.record.idle_seconds(now)));
        }
        if let Some(t) = self.engine.modes().tick(&mut session.record.mode, now) {
            self.publish_mode(identity, t);
        }

        let record = &mut session.record;
        let snapshot = SnapshotBuilder.build(&results, &mut record.window, operation, now);
        if let Some(reason) = record.ledger.reset_if_triggered(&snapshot) {
            self.events.publish(Event::TrustReset {
                identity: identity.to_string(),
                reason: reason.to_string(),
            });
        }
        record.ledger.touch(now);
        record.last_activity = Some(now);

        let mut decision = self
            .engine
            .evaluate(operation, &snapshot, &record.ledger, &record.mode);

        self.persist(identity, session);
        if !session.persistent {
            decision.reasons.push(STORE_UNAVAILABLE_REASON.to_string());
        }

        info!(
            identity,
            score = decision.score(),
            action = %decision.action,
            mode = %decision.mode,
            "decision made"
        );
        self.events.publish(Event::DecisionMade {
            identity: identity.to_string(),
            operation: operation.raw_text.clone(),
            score: decision.score(),
            action: decision.action,
            timestamp: now,
        });
        Ok(decision)
    }

    /// The decision `operation` would get, without recording anything.
    pub fn preview(
        &self,
        identity: &str,
        operation: &Operation,
        mut results: ProbeResults,
    ) -> Result<Decision> {
        operation.validate()?;
        let now = Utc::now();
        let handle = self.session(identity, now);
        let session = handle.lock();

        if !results.has(|f| matches!(f, ProbeFact::IdleSeconds(_))) {
            results.push(ProbeFact::IdleSeconds(session.record.idle_seconds(now)));
        }
        let mut mode = session.record.mode;
        self.engine.modes().tick(&mut mode, now);
        let mut ledger = session.record.ledger.clone();
        let snapshot = SnapshotBuilder.preview(&results, &session.record.window, operation, now);
        ledger.reset_if_triggered(&snapshot);

        Ok(self.engine.evaluate(operation, &snapshot, &ledger, &mode))
    }

    /// Record what the human did with an operation. Returns `true` when its
    /// pattern just became auto-trusted.
    pub fn report_outcome(
        &self,
        identity: &str,
        operation: &Operation,
        approved: bool,
        was_mistake: bool,
    ) -> Result<bool> {
        operation.validate()?;
        let now = Utc::now();
        let pattern = pattern_key(operation);
        let handle = self.session(identity, now);
        let mut guard = handle.lock();
        let session = &mut *guard;

        let newly_trusted = session
            .record
            .ledger
            .record_outcome(&pattern, approved, was_mistake, now);
        self.persist(identity, session);

        info!(identity, pattern = %pattern, approved, was_mistake, "outcome reported");
        self.events.publish(Event::OutcomeReported {
            identity: identity.to_string(),
            pattern: pattern.clone(),
            approved,
            was_mistake,
        });
        if newly_trusted {
            self.events.publish(Event::PatternAutoTrusted {
                identity: identity.to_string(),
                pattern,
            });
        }
        Ok(newly_trusted)
    }

    /// Decide whether an evaluated operation may run, checkpointing it first
    /// when its score calls for it.
    ///
    /// A blocked operation needs `override_block` and a checkpoint that
    /// succeeded; anything else is denied.
    pub fn authorize(
        &self,
        identity: &str,
        operation: &Operation,
        decision: &Decision,
        override_block: bool,
    ) -> Result<Authorization> {
        operation.validate()?;
        let blocked = decision.action == Action::Block;
        if blocked && !override_block {
            return Ok(Authorization::Denied {
                reason: format!("blocked at risk {}", decision.risk_score),
            });
        }
        if !blocked && decision.score() < self.config.recovery.min_risk {
            return Ok(Authorization::Proceed { checkpoint: None });
        }

        let cwd = self.session_dir(identity);
        let authorization = match self.recovery.checkpoint(operation, &cwd) {
            Ok(cp) => {
                self.events.publish(Event::CheckpointCreated {
                    checkpoint_id: cp.id,
                    strategy: cp.strategy.to_string(),
                    expires_at: cp.expires_at,
                });
                Authorization::Proceed {
                    checkpoint: Some(cp),
                }
            }
            Err(e) if blocked => Authorization::Denied {
                reason: format!("override refused, no checkpoint: {e}"),
            },
            Err(WardenError::UnsupportedOperationKind { .. }) => Authorization::ProceedAtOwnRisk {
                reason: warden_policy::policy::NO_CHECKPOINT_REASON.to_string(),
            },
            Err(e) => Authorization::ProceedAtOwnRisk {
                reason: e.to_string(),
            },
        };
        info!(identity, override_block, may_proceed = authorization.may_proceed(), "authorization");
        Ok(authorization)
    }

    fn session_dir(&self, identity: &str) -> PathBuf {
        self.sessions
            .get(identity)
            .and_then(|s| {
                s.lock()
                    .record
                    .ledger
                    .last_context
                    .as_ref()
                    .map(|c| PathBuf::from(&c.working_dir))
            })
            .filter(|p| p.is_dir())
            .unwrap_or_else(|| self.working_dir.clone())
    }

    // ── Recovery ───────────────────────────────────────────────

    pub fn restore(&self, id: &CheckpointId) -> Result<RecoveryCheckpoint> {
        let cp = self.recovery.restore(id)?;
        self.events.publish(Event::CheckpointRestored { checkpoint_id: cp.id });
        Ok(cp)
    }

    pub fn checkpoints(&self) -> Result<Vec<RecoveryCheckpoint>> {
        self.recovery.list()
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.recovery.purge_expired()
    }

    // ── Modes ──────────────────────────────────────────────────

    /// The current mode, after any timer-driven transition.
    pub fn mode(&self, identity: &str) -> ModeState {
        self.change_mode(identity, |_, _, _| Ok(None))
            .map(|(state, _)| state)
            .unwrap_or(ModeState::Adaptive)
    }

    pub fn enter_flow(&self, identity: &str, minutes: Option<u32>) -> Result<ModeState> {
        self.change_mode(identity, |modes, state, now| {
            modes.enter_flow(state, minutes, now).map(Some)
        })
        .map(|(state, _)| state)
    }

    pub fn exit_flow(&self, identity: &str) -> Result<ModeState> {
        self.change_mode(identity, |modes, state, _| modes.exit_flow(state).map(Some))
            .map(|(state, _)| state)
    }

    pub fn enter_paranoid(&self, identity: &str) -> Result<ModeState> {
        self.change_mode(identity, |modes, state, _| modes.enter_paranoid(state).map(Some))
            .map(|(state, _)| state)
    }

    pub fn exit_paranoid(&self, identity: &str) -> Result<ModeState> {
        self.change_mode(identity, |modes, state, _| modes.exit_paranoid(state).map(Some))
            .map(|(state, _)| state)
    }

    fn change_mode<F>(&self, identity: &str, change: F) -> Result<(ModeState, Option<ModeTransition>)>
    where
        F: FnOnce(&ModeController, &mut ModeState, DateTime<Utc>) -> Result<Option<ModeTransition>>,
    {
        let now = Utc::now();
        let handle = self.session(identity, now);
        let mut guard = handle.lock();
        let session = &mut *guard;
        let modes = self.engine.modes();

        let ticked = modes.tick(&mut session.record.mode, now);
        if let Some(t) = ticked {
            self.publish_mode(identity, t);
        }
        let mut scratch = session.record.mode;
        let changed = change(modes, &mut scratch, now)?;
        session.record.mode = scratch;
        if let Some(t) = changed {
            info!(identity, from = %t.from, to = %t.to, "mode changed");
            self.publish_mode(identity, t);
        }
        if ticked.is_some() || changed.is_some() {
            self.persist(identity, session);
        }
        Ok((session.record.mode, changed.or(ticked)))
    }

    fn publish_mode(&self, identity: &str, t: ModeTransition) {
        if t.from != t.to {
            self.events.publish(Event::ModeChanged {
                identity: identity.to_string(),
                from: t.from,
                to: t.to,
            });
        }
    }

    // ── Trust ──────────────────────────────────────────────────

    pub fn trust(&self, identity: &str, pattern: &str) -> TrustInfo {
        self.session(identity, Utc::now())
            .lock()
            .record
            .ledger
            .lookup(pattern)
    }

    // ── Sessions ───────────────────────────────────────────────

    fn session(&self, identity: &str, now: DateTime<Utc>) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.get(identity) {
            return existing.clone();
        }
        let loaded = self.load_session(identity, now);
        self.sessions
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone()
    }

    fn load_session(&self, identity: &str, now: DateTime<Utc>) -> Session {
        let policy = TrustPolicy::from(&self.config.trust);
        let capacity = self.config.engine.window_capacity;

        let stored = self.store.get(&store_key(identity)).and_then(|raw| {
            raw.map(|r| serde_json::from_str::<SessionRecord>(&r).map_err(WardenError::from))
                .transpose()
        });
        match stored {
            Ok(Some(mut record)) => {
                record.ledger.set_policy(policy);
                record.window.resize(capacity);
                debug!(identity, "session restored");
                Session {
                    record,
                    persistent: true,
                }
            }
            Ok(None) => Session {
                record: self.fresh_record(identity, policy, capacity, now),
                persistent: true,
            },
            Err(e) => {
                // The stored record is left alone; this session lives in memory.
                self.store_failed(identity, &e);
                Session {
                    record: self.fresh_record(identity, policy, capacity, now),
                    persistent: false,
                }
            }
        }
    }

    fn fresh_record(
        &self,
        identity: &str,
        policy: TrustPolicy,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> SessionRecord {
        let ledger = TrustLedger::new(policy, now);
        SessionRecord {
            identity: identity.to_string(),
            mode: self.engine.modes().initial(ledger.has_history(), now),
            ledger,
            window: OperationWindow::new(capacity),
            last_activity: None,
            created_at: now,
        }
    }

    fn persist(&self, identity: &str, session: &mut Session) {
        if !session.persistent {
            return;
        }
        let saved = serde_json::to_string(&session.record)
            .map_err(WardenError::from)
            .and_then(|raw| self.store.put(&store_key(identity), &raw, None));
        if let Err(e) = saved {
            session.persistent = false;
            self.store_failed(identity, &e);
        }
    }

    fn store_failed(&self, identity: &str, error: &WardenError) {
        warn!(identity, error = %error, "session store failed, continuing in memory");
        self.events.publish(Event::StoreUnavailable {
            identity: identity.to_string(),
            error: error.to_string(),
        });
    }

    /// Working directory used when no session has recorded one.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
