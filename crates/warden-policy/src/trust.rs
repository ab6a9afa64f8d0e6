//! Per-identity trust: approved patterns, mistakes and reset triggers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use warden_config::TrustConfig;
use warden_core::{Operation, OperationKind, after_secs, command::looks_like_path};

use crate::context::ContextSnapshot;
use crate::predicate::TrustSignals;

/// The key under which approvals of an operation accumulate.
///
/// Shell commands collapse to program + subcommand, so `git push origin a`
/// and `git push origin b` share trust while `git push` and `git reset` do not.
pub fn pattern_key(operation: &Operation) -> String {
    match operation.kind {
        OperationKind::Shell => match operation.command_line() {
            Some(cmd) => {
                let seg = cmd.primary();
                let mut key = String::from("shell:");
                if cmd.is_elevated() {
                    key.push_str("sudo ");
                }
                key.push_str(&seg.program);
                if let Some(sub) = seg.subcommand()
                    && !looks_like_path(sub)
                {
                    key.push(' ');
                    key.push_str(sub);
                }
                key
            }
            None => format!("shell:{}", operation.raw_text.trim()),
        },
        OperationKind::FileRead | OperationKind::FileWrite => format!(
            "{}:{}",
            operation.kind,
            operation.target_path.as_deref().unwrap_or(&operation.raw_text)
        ),
        OperationKind::NetworkFetch => {
            format!("network:{}", operation.url_host().unwrap_or_else(|| operation.raw_text.clone()))
        }
        OperationKind::ToolCall => {
            format!("tool:{}", operation.tool_name.as_deref().unwrap_or("unknown"))
        }
        OperationKind::Unknown => format!(
            "unknown:{}",
            operation.raw_text.split_whitespace().next().unwrap_or_default()
        ),
    }
}

/// Thresholds governing trust accumulation and decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    pub auto_trust_after: u32,
    pub idle_reset_secs: u64,
    pub mistake_cooldown_secs: u64,
    pub max_mistake_log: usize,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::from(&TrustConfig::default())
    }
}

impl From<&TrustConfig> for TrustPolicy {
    fn from(c: &TrustConfig) -> Self {
        Self {
            auto_trust_after: c.auto_trust_after,
            idle_reset_secs: c.idle_reset_secs,
            mistake_cooldown_secs: c.mistake_cooldown_secs,
            max_mistake_log: c.max_mistake_log,
        }
    }
}

/// Approval history for one pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTrust {
    pub approval_count: u32,
    pub last_approved_at: DateTime<Utc>,
}

/// What a lookup tells the rule evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustInfo {
    pub approval_count: u32,
    pub last_approved_at: Option<DateTime<Utc>>,
    pub auto_trusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeEntry {
    pub pattern: String,
    pub timestamp: DateTime<Utc>,
}

/// The parts of a snapshot whose change invalidates trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFingerprint {
    pub working_dir: String,
    pub git_branch: String,
    pub is_ci: bool,
    pub is_container: bool,
    pub is_remote_session: bool,
}

impl From<&ContextSnapshot> for ContextFingerprint {
    fn from(s: &ContextSnapshot) -> Self {
        Self {
            working_dir: s.working_dir.clone(),
            git_branch: s.git_branch.clone(),
            is_ci: s.is_ci,
            is_container: s.is_container,
            is_remote_session: s.is_remote_session,
        }
    }
}

/// Why trusted patterns were cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    WorkingDirChanged { from: String, to: String },
    BranchChanged { from: String, to: String },
    Idle { seconds: u64 },
    EnvironmentChanged { flag: String },
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkingDirChanged { from, to } => {
                write!(f, "working directory changed ({from} -> {to})")
            }
            Self::BranchChanged { from, to } => write!(f, "git branch changed ({from} -> {to})"),
            Self::Idle { seconds } if *seconds == u64::MAX => f.write_str("idle time unknown"),
            Self::Idle { seconds } => write!(f, "idle for {seconds}s"),
            Self::EnvironmentChanged { flag } => write!(f, "{flag} status changed"),
        }
    }
}

/// Per-identity record of approvals and mistakes.
///
/// Only [`record_outcome`](Self::record_outcome) raises approval counts;
/// evaluation reads the ledger without touching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustLedger {
    pub trusted_patterns: BTreeMap<String, PatternTrust>,
    pub mistake_log: Vec<MistakeEntry>,
    pub session_started_at: DateTime<Utc>,
    pub observation_day: u32,
    #[serde(default)]
    pub recent_mistake_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_context: Option<ContextFingerprint>,
    #[serde(skip)]
    policy: TrustPolicy,
}

impl TrustLedger {
    pub fn new(policy: TrustPolicy, now: DateTime<Utc>) -> Self {
        Self {
            trusted_patterns: BTreeMap::new(),
            mistake_log: Vec::new(),
            session_started_at: now,
            observation_day: 0,
            recent_mistake_until: None,
            last_context: None,
            policy,
        }
    }

    /// Re-attach thresholds after deserialisation.
    pub fn set_policy(&mut self, policy: TrustPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    pub fn lookup(&self, pattern: &str) -> TrustInfo {
        match self.trusted_patterns.get(pattern) {
            Some(t) => TrustInfo {
                approval_count: t.approval_count,
                last_approved_at: Some(t.last_approved_at),
                auto_trusted: t.approval_count >= self.policy.auto_trust_after,
            },
            None => TrustInfo::default(),
        }
    }

    pub fn has_recent_mistake(&self, now: DateTime<Utc>) -> bool {
        self.recent_mistake_until.is_some_and(|until| now < until)
    }

    /// Trust inputs for evaluating `operation` at `now`.
    pub fn signals(&self, operation: &Operation, now: DateTime<Utc>) -> TrustSignals {
        TrustSignals {
            previously_approved: self.lookup(&pattern_key(operation)).auto_trusted,
            recent_mistake: self.has_recent_mistake(now),
        }
    }

    /// Apply a reported outcome. Returns `true` when the pattern just became auto-trusted.
    pub fn record_outcome(
        &mut self,
        pattern: &str,
        approved: bool,
        was_mistake: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let mut newly_trusted = false;
        if approved {
            let entry = self
                .trusted_patterns
                .entry(pattern.to_string())
                .or_insert(PatternTrust {
                    approval_count: 0,
                    last_approved_at: now,
                });
            entry.approval_count = entry.approval_count.saturating_add(1);
            entry.last_approved_at = now;
            newly_trusted = entry.approval_count == self.policy.auto_trust_after;
            debug!(pattern, count = entry.approval_count, "approval recorded");
        }
        if was_mistake {
            self.mistake_log.push(MistakeEntry {
                pattern: pattern.to_string(),
                timestamp: now,
            });
            let excess = self.mistake_log.len().saturating_sub(self.policy.max_mistake_log);
            if excess > 0 {
                self.mistake_log.drain(..excess);
            }
            self.recent_mistake_until = Some(after_secs(now, self.policy.mistake_cooldown_secs));
            info!(pattern, "mistake recorded");
        }
        newly_trusted
    }

    /// Clear trusted patterns if the context moved on since the last call.
    ///
    /// The mistake log survives every reset. The first call for a ledger
    /// only records the context, unless the session has been idle too long.
    pub fn reset_if_triggered(&mut self, snapshot: &ContextSnapshot) -> Option<ResetReason> {
        let current = ContextFingerprint::from(snapshot);
        let reason = self.reset_reason(&current, snapshot.idle_seconds);
        self.last_context = Some(current);

        if let Some(ref r) = reason {
            let cleared = self.trusted_patterns.len();
            self.trusted_patterns.clear();
            if cleared > 0 {
                info!(reason = %r, cleared, "trust reset");
            }
        }
        reason
    }

    fn reset_reason(&self, current: &ContextFingerprint, idle_seconds: u64) -> Option<ResetReason> {
        if idle_seconds > self.policy.idle_reset_secs {
            return Some(ResetReason::Idle {
                seconds: idle_seconds,
            });
        }
        let previous = self.last_context.as_ref()?;
        if previous.working_dir != current.working_dir {
            return Some(ResetReason::WorkingDirChanged {
                from: previous.working_dir.clone(),
                to: current.working_dir.clone(),
            });
        }
        if previous.git_branch != current.git_branch {
            return Some(ResetReason::BranchChanged {
                from: previous.git_branch.clone(),
                to: current.git_branch.clone(),
            });
        }
        let flips = [
            ("CI", previous.is_ci != current.is_ci),
            ("container", previous.is_container != current.is_container),
            ("remote session", previous.is_remote_session != current.is_remote_session),
        ];
        flips
            .into_iter()
            .find(|(_, flipped)| *flipped)
            .map(|(flag, _)| ResetReason::EnvironmentChanged { flag: flag.into() })
    }

    /// Advance the observation day counter.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let days = (now - self.session_started_at).num_days().max(0);
        self.observation_day = u32::try_from(days).unwrap_or(u32::MAX);
    }

    /// Whether this ledger has seen anything worth keeping.
    pub fn has_history(&self) -> bool {
        !self.trusted_patterns.is_empty() || !self.mistake_log.is_empty()
    }
}
