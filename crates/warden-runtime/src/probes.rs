//! The probes Warden runs on a real machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::process::Command;
use tracing::debug;

use warden_core::{Result, WardenError};
use warden_policy::{ContextProbe, ProbeFact};
use warden_recovery::git;

/// Reports the directory commands will run in.
pub struct WorkingDirProbe {
    dir: PathBuf,
}

impl WorkingDirProbe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ContextProbe for WorkingDirProbe {
    fn name(&self) -> &str {
        "working_dir"
    }

    async fn probe(&self) -> Result<Vec<ProbeFact>> {
        if !self.dir.is_dir() {
            return Err(WardenError::ProbeUnavailable {
                probe: self.name().into(),
                reason: format!("{} is not a directory", self.dir.display()),
            });
        }
        Ok(vec![ProbeFact::WorkingDir(
            self.dir.to_string_lossy().into_owned(),
        )])
    }
}

/// Branch from the HEAD file, dirtiness from `git status --porcelain`.
pub struct GitProbe {
    dir: PathBuf,
}

impl GitProbe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ContextProbe for GitProbe {
    fn name(&self) -> &str {
        "git"
    }

    async fn probe(&self) -> Result<Vec<ProbeFact>> {
        let branch = git::current_branch(&self.dir).ok_or_else(|| WardenError::ProbeUnavailable {
            probe: self.name().into(),
            reason: format!("{} is not inside a git repository", self.dir.display()),
        })?;
        let mut facts = vec![ProbeFact::GitBranch(branch)];

        // A missing git binary leaves the dirtiness fact out; the snapshot
        // then assumes a dirty tree.
        match Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&self.dir)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(out) if out.status.success() => {
                facts.push(ProbeFact::UncommittedChanges(!out.stdout.trim_ascii().is_empty()));
            }
            Ok(out) => debug!(status = %out.status, "git status failed"),
            Err(e) => debug!(error = %e, "git not runnable"),
        }
        Ok(facts)
    }
}

const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "CIRCLECI",
    "TF_BUILD",
];
const REMOTE_VARS: &[&str] = &["SSH_CONNECTION", "SSH_CLIENT", "SSH_TTY"];
const CONTAINER_MARKERS: &[&str] = &["/.dockerenv", "/run/.containerenv"];
const ENVIRONMENT_VARS: &[&str] = &["WARDEN_ENV", "APP_ENV", "NODE_ENV"];

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// CI, remote-session, container and production flags from the process environment.
pub struct EnvironmentProbe {
    lookup: Lookup,
    container_markers: Vec<PathBuf>,
}

impl Default for EnvironmentProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentProbe {
    pub fn new() -> Self {
        Self {
            lookup: Arc::new(|k| std::env::var(k).ok()),
            container_markers: CONTAINER_MARKERS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Read variables through `lookup` instead of the real environment.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
            container_markers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_container_markers(mut self, markers: Vec<PathBuf>) -> Self {
        self.container_markers = markers;
        self
    }

    fn set(&self, key: &str) -> bool {
        (self.lookup)(key).is_some_and(|v| {
            let v = v.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        })
    }

    fn is_production(&self) -> bool {
        ENVIRONMENT_VARS.iter().any(|k| {
            (self.lookup)(k).is_some_and(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod")
            })
        })
    }

    fn is_container(&self) -> bool {
        self.container_markers.iter().any(|p| Path::new(p).exists())
            || self.set("container")
            || self.set("KUBERNETES_SERVICE_HOST")
    }
}

#[async_trait]
impl ContextProbe for EnvironmentProbe {
    fn name(&self) -> &str {
        "environment"
    }

    async fn probe(&self) -> Result<Vec<ProbeFact>> {
        Ok(vec![
            ProbeFact::Ci(CI_VARS.iter().any(|k| self.set(k))),
            ProbeFact::RemoteSession(REMOTE_VARS.iter().any(|k| self.set(k))),
            ProbeFact::Container(self.is_container()),
            ProbeFact::Production(self.is_production()),
        ])
    }
}

/// Local wall-clock time.
pub struct ClockProbe;

#[async_trait]
impl ContextProbe for ClockProbe {
    fn name(&self) -> &str {
        "clock"
    }

    async fn probe(&self) -> Result<Vec<ProbeFact>> {
        Ok(vec![ProbeFact::LocalTime(Local::now().fixed_offset())])
    }
}

/// The standard probe set for commands run in `cwd`.
pub fn system_probes(cwd: &Path) -> Vec<Arc<dyn ContextProbe>> {
    vec![
        Arc::new(WorkingDirProbe::new(cwd)),
        Arc::new(GitProbe::new(cwd)),
        Arc::new(EnvironmentProbe::new()),
        Arc::new(ClockProbe),
    ]
}
