//! Context gathering and fail-closed snapshot assembly.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warden_core::{Operation, Result};

/// A single fact reported by a context probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact", content = "value", rename_all = "snake_case")]
pub enum ProbeFact {
    WorkingDir(String),
    GitBranch(String),
    UncommittedChanges(bool),
    Production(bool),
    Ci(bool),
    RemoteSession(bool),
    Container(bool),
    LocalTime(DateTime<FixedOffset>),
    IdleSeconds(u64),
}

/// A probe that did not deliver in time or failed outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub probe: String,
    pub reason: String,
}

/// Everything the probes returned for one decision.
///
/// Later facts of the same kind override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResults {
    pub facts: Vec<ProbeFact>,
    #[serde(default)]
    pub failures: Vec<ProbeFailure>,
}

impl ProbeResults {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, fact: ProbeFact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn push(&mut self, fact: ProbeFact) {
        self.facts.push(fact);
    }

    /// Whether any fact satisfies `pick`.
    pub fn has(&self, pick: impl Fn(&ProbeFact) -> bool) -> bool {
        self.facts.iter().any(pick)
    }

    fn last<T>(&self, pick: impl Fn(&ProbeFact) -> Option<T>) -> Option<T> {
        self.facts.iter().rev().find_map(pick)
    }
}

/// A source of environment facts (git, filesystem, env vars, clock).
#[async_trait]
pub trait ContextProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Collect facts. An error marks every fact this probe owns as unavailable.
    async fn probe(&self) -> Result<Vec<ProbeFact>>;
}

/// Run every probe concurrently, each bounded by `timeout`. Never retries.
pub async fn gather(probes: &[Arc<dyn ContextProbe>], timeout: Duration) -> ProbeResults {
    let runs = probes.iter().map(|probe| {
        let probe = Arc::clone(probe);
        async move {
            let outcome = tokio::time::timeout(timeout, probe.probe()).await;
            (probe.name().to_string(), outcome)
        }
    });

    let mut results = ProbeResults::new();
    for (name, outcome) in join_all(runs).await {
        match outcome {
            Ok(Ok(facts)) => {
                debug!(probe = %name, count = facts.len(), "probe delivered");
                results.facts.extend(facts);
            }
            Ok(Err(e)) => {
                warn!(probe = %name, error = %e, "probe failed");
                results.failures.push(ProbeFailure {
                    probe: name,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(probe = %name, timeout_ms = timeout.as_millis() as u64, "probe timed out");
                results.failures.push(ProbeFailure {
                    probe: name,
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                });
            }
        }
    }
    results
}

/// A conservative default substituted for a missing fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub fact: String,
    pub assumption: String,
}

impl Degradation {
    fn new(fact: &str, assumption: &str) -> Self {
        Self {
            fact: fact.into(),
            assumption: assumption.into(),
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context unavailable: {} (treated as {})", self.fact, self.assumption)
    }
}

/// Bounded FIFO of the most recent operations of one session, newest last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationWindow {
    capacity: usize,
    operations: VecDeque<Operation>,
}

impl OperationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            operations: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, operation: Operation) {
        while self.operations.len() >= self.capacity {
            self.operations.pop_front();
        }
        self.operations.push_back(operation);
    }

    /// Change the capacity, evicting the oldest entries if it shrank.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.operations.len() > self.capacity {
            self.operations.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// A copy of the window contents, oldest first.
    pub fn to_vec(&self) -> Vec<Operation> {
        self.operations.iter().cloned().collect()
    }
}

/// Immutable description of the environment at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub working_dir: String,
    pub git_branch: String,
    pub has_uncommitted_changes: bool,
    pub is_production: bool,
    pub is_ci: bool,
    pub is_remote_session: bool,
    pub is_container: bool,
    /// Local hour, 0-23.
    pub time_of_day: u8,
    pub idle_seconds: u64,
    pub captured_at: DateTime<Utc>,
    /// Recent operations including the one being evaluated, newest last.
    pub recent_operations: Vec<Operation>,
    pub degraded: Vec<Degradation>,
}

impl ContextSnapshot {
    /// The operation being evaluated.
    pub fn current(&self) -> Option<&Operation> {
        self.recent_operations.last()
    }

    /// Operations seen before the current one.
    pub fn history(&self) -> &[Operation] {
        match self.recent_operations.len() {
            0 => &[],
            n => &self.recent_operations[..n - 1],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Assembles [`ContextSnapshot`]s from probe results. Performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Record `operation` in the window, then build a snapshot that includes it.
    pub fn build(
        &self,
        results: &ProbeResults,
        window: &mut OperationWindow,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> ContextSnapshot {
        window.push(operation.clone());
        self.assemble(results, window.to_vec(), now)
    }

    /// Like [`build`](Self::build) but leaves the window untouched.
    pub fn preview(
        &self,
        results: &ProbeResults,
        window: &OperationWindow,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> ContextSnapshot {
        let mut scratch = window.clone();
        scratch.push(operation.clone());
        self.assemble(results, scratch.to_vec(), now)
    }

    fn assemble(
        &self,
        results: &ProbeResults,
        recent_operations: Vec<Operation>,
        now: DateTime<Utc>,
    ) -> ContextSnapshot {
        let mut degraded = Vec::new();

        let working_dir = results
            .last(|f| match f {
                ProbeFact::WorkingDir(d) if !d.trim().is_empty() => Some(d.clone()),
                _ => None,
            })
            .unwrap_or_else(|| {
                degraded.push(Degradation::new("working directory", "filesystem root"));
                "/".to_string()
            });

        let branch = results.last(|f| match f {
            ProbeFact::GitBranch(b) if !b.trim().is_empty() => Some(b.clone()),
            _ => None,
        });
        let branch_known = branch.is_some();
        let git_branch = branch.unwrap_or_else(|| {
            degraded.push(Degradation::new("git branch", "production"));
            "unknown".to_string()
        });

        let has_uncommitted_changes = flag(
            results,
            &mut degraded,
            |f| match f {
                ProbeFact::UncommittedChanges(v) => Some(*v),
                _ => None,
            },
            "uncommitted changes",
            "dirty working tree",
            true,
        );
        let production = flag(
            results,
            &mut degraded,
            |f| match f {
                ProbeFact::Production(v) => Some(*v),
                _ => None,
            },
            "environment",
            "production",
            true,
        );
        let is_ci = flag(
            results,
            &mut degraded,
            |f| match f {
                ProbeFact::Ci(v) => Some(*v),
                _ => None,
            },
            "CI detection",
            "CI",
            true,
        );
        let is_remote_session = flag(
            results,
            &mut degraded,
            |f| match f {
                ProbeFact::RemoteSession(v) => Some(*v),
                _ => None,
            },
            "session type",
            "remote session",
            true,
        );
        let is_container = flag(
            results,
            &mut degraded,
            |f| match f {
                ProbeFact::Container(v) => Some(*v),
                _ => None,
            },
            "container detection",
            "host system",
            false,
        );

        let time_of_day = results
            .last(|f| match f {
                ProbeFact::LocalTime(t) => Some(t.hour() as u8),
                _ => None,
            })
            .unwrap_or_else(|| {
                // Unix epoch, hour 0
                degraded.push(Degradation::new("local clock", "off-hours"));
                0
            });

        let idle_seconds = results
            .last(|f| match f {
                ProbeFact::IdleSeconds(s) => Some(*s),
                _ => None,
            })
            .unwrap_or_else(|| {
                degraded.push(Degradation::new("idle time", "idle past the trust timeout"));
                u64::MAX
            });

        ContextSnapshot {
            working_dir,
            git_branch,
            has_uncommitted_changes,
            // An unknown branch counts as production no matter what the env says.
            is_production: production || !branch_known,
            is_ci,
            is_remote_session,
            is_container,
            time_of_day,
            idle_seconds,
            captured_at: now,
            recent_operations,
            degraded,
        }
    }
}

fn flag(
    results: &ProbeResults,
    degraded: &mut Vec<Degradation>,
    pick: impl Fn(&ProbeFact) -> Option<bool>,
    fact: &str,
    assumption: &str,
    default: bool,
) -> bool {
    results.last(pick).unwrap_or_else(|| {
        degraded.push(Degradation::new(fact, assumption));
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_results() -> ProbeResults {
        let local = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 14, 30, 0)
            .unwrap();
        ProbeResults::new()
            .with(ProbeFact::WorkingDir("/work/app".into()))
            .with(ProbeFact::GitBranch("feature/x".into()))
            .with(ProbeFact::UncommittedChanges(false))
            .with(ProbeFact::Production(false))
            .with(ProbeFact::Ci(false))
            .with(ProbeFact::RemoteSession(false))
            .with(ProbeFact::Container(false))
            .with(ProbeFact::LocalTime(local))
            .with(ProbeFact::IdleSeconds(12))
    }

    #[test]
    fn complete_results_are_not_degraded() {
        let mut window = OperationWindow::new(5);
        let snap = SnapshotBuilder.build(&full_results(), &mut window, &Operation::shell("ls"), Utc::now());
        assert!(!snap.is_degraded());
        assert_eq!(snap.working_dir, "/work/app");
        assert_eq!(snap.time_of_day, 14);
        assert!(!snap.is_production);
        assert_eq!(snap.recent_operations.len(), 1);
    }

    #[test]
    fn empty_results_fail_closed() {
        let mut window = OperationWindow::new(5);
        let snap = SnapshotBuilder.build(&ProbeResults::new(), &mut window, &Operation::shell("ls"), Utc::now());
        assert_eq!(snap.working_dir, "/");
        assert_eq!(snap.git_branch, "unknown");
        assert!(snap.is_production);
        assert!(snap.has_uncommitted_changes);
        assert!(snap.is_ci);
        assert!(snap.is_remote_session);
        assert!(!snap.is_container);
        assert_eq!(snap.time_of_day, 0);
        assert_eq!(snap.idle_seconds, u64::MAX);
        assert_eq!(snap.degraded.len(), 9);
    }

    #[test]
    fn unknown_branch_forces_production() {
        let results = ProbeResults::new().with(ProbeFact::Production(false));
        let snap = SnapshotBuilder.preview(&results, &OperationWindow::new(5), &Operation::shell("ls"), Utc::now());
        assert!(snap.is_production);
        assert!(snap.degraded.iter().any(|d| d.to_string().contains("treated as production")));
    }

    #[test]
    fn window_evicts_fifo() {
        let mut window = OperationWindow::new(2);
        for cmd in ["a", "b", "c"] {
            window.push(Operation::shell(cmd));
        }
        let texts: Vec<_> = window.to_vec().into_iter().map(|o| o.raw_text).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn preview_leaves_window_alone() {
        let window = OperationWindow::new(3);
        let snap = SnapshotBuilder.preview(&full_results(), &window, &Operation::shell("ls"), Utc::now());
        assert_eq!(snap.recent_operations.len(), 1);
        assert!(window.is_empty());
    }
}
