//! Named context predicates and the facts that make them hold.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use warden_core::{Operation, OperationKind, WardenError};

use crate::context::ContextSnapshot;
use crate::paths;
use crate::trust::pattern_key;

/// Programs that only read what their arguments name.
const READ_ONLY_PROGRAMS: &[&str] = &[
    "cat", "less", "more", "head", "tail", "ls", "stat", "file", "wc", "grep", "rg", "find", "du",
    "diff", "tree", "md5sum", "sha256sum", "readlink", "realpath",
];

/// Programs that send data off the machine.
const TRANSMITTING_PROGRAMS: &[&str] = &[
    "curl", "wget", "scp", "rsync", "nc", "ncat", "netcat", "ftp", "sftp", "ssh", "telnet",
];

/// Tool name fragments that indicate outbound data.
const TRANSMITTING_TOOLS: &[&str] = &["send", "post", "upload", "email", "publish", "webhook"];

/// A named condition over an operation and its context.
///
/// Each predicate carries a signed risk modifier configured in the rule book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Production,
    UncommittedChanges,
    TestDirectory,
    UserRequested,
    RepeatedOperation,
    Ci,
    RemoteSession,
    Container,
    RecentMistake,
    OffHours,
    Elevated,
    Reversible,
    HasBackup,
    SystemPath,
    TransmitsExternally,
    PreviouslyApproved,
}

impl Predicate {
    pub const ALL: [Predicate; 16] = [
        Self::Production,
        Self::UncommittedChanges,
        Self::TestDirectory,
        Self::UserRequested,
        Self::RepeatedOperation,
        Self::Ci,
        Self::RemoteSession,
        Self::Container,
        Self::RecentMistake,
        Self::OffHours,
        Self::Elevated,
        Self::Reversible,
        Self::HasBackup,
        Self::SystemPath,
        Self::TransmitsExternally,
        Self::PreviouslyApproved,
    ];

    /// The key used in rule book tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::UncommittedChanges => "uncommitted_changes",
            Self::TestDirectory => "test_directory",
            Self::UserRequested => "user_requested",
            Self::RepeatedOperation => "repeated_operation",
            Self::Ci => "ci",
            Self::RemoteSession => "remote_session",
            Self::Container => "container",
            Self::RecentMistake => "recent_mistake",
            Self::OffHours => "off_hours",
            Self::Elevated => "elevated",
            Self::Reversible => "reversible",
            Self::HasBackup => "has_backup",
            Self::SystemPath => "system_path",
            Self::TransmitsExternally => "transmits_externally",
            Self::PreviouslyApproved => "previously_approved",
        }
    }

    /// Human-readable label used in decision reasons.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Production => "production environment",
            Self::UncommittedChanges => "uncommitted changes",
            Self::TestDirectory => "test directory",
            Self::UserRequested => "explicitly requested by user",
            Self::RepeatedOperation => "repeated operation",
            Self::Ci => "running in CI",
            Self::RemoteSession => "remote session",
            Self::Container => "containerised",
            Self::RecentMistake => "recent mistake reported",
            Self::OffHours => "off-hours",
            Self::Elevated => "elevated privileges",
            Self::Reversible => "reversible",
            Self::HasBackup => "backup available",
            Self::SystemPath => "affects system path",
            Self::TransmitsExternally => "transmits data externally",
            Self::PreviouslyApproved => "previously approved pattern",
        }
    }

    /// Built-in modifier value, used when the rule book does not set one.
    pub fn default_modifier(&self) -> i32 {
        match self {
            Self::Production => 3,
            Self::UncommittedChanges => 1,
            Self::TestDirectory => -2,
            Self::UserRequested => -3,
            Self::RepeatedOperation => -2,
            Self::Ci => 2,
            Self::RemoteSession => 1,
            Self::Container => -1,
            Self::RecentMistake => 2,
            Self::OffHours => 1,
            Self::Elevated => 2,
            Self::Reversible => -2,
            Self::HasBackup => -3,
            Self::SystemPath => 4,
            Self::TransmitsExternally => 3,
            Self::PreviouslyApproved => -3,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predicate {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| WardenError::RuleBook(format!("unknown predicate '{s}'")))
    }
}

/// Local-hour window considered off-hours. Wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffHours {
    pub start: u8,
    pub end: u8,
}

impl Default for OffHours {
    fn default() -> Self {
        Self { start: 22, end: 7 }
    }
}

impl OffHours {
    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Trust-derived inputs for predicate evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustSignals {
    pub previously_approved: bool,
    pub recent_mistake: bool,
}

/// Evaluate every predicate for one operation.
///
/// `rule_reversible` is the reversibility flag of the winning rule, if any.
pub fn observe(
    operation: &Operation,
    snapshot: &ContextSnapshot,
    trust: TrustSignals,
    rule_reversible: bool,
    off_hours: OffHours,
) -> BTreeSet<Predicate> {
    let mut held = BTreeSet::new();
    let mut set = |p: Predicate, cond: bool| {
        if cond {
            held.insert(p);
        }
    };

    let targets: Vec<String> = operation
        .referenced_paths()
        .iter()
        .map(|p| paths::normalize(p, &snapshot.working_dir))
        .collect();

    set(Predicate::Production, snapshot.is_production);
    set(Predicate::UncommittedChanges, snapshot.has_uncommitted_changes);
    set(
        Predicate::TestDirectory,
        paths::is_test_path(&paths::normalize(".", &snapshot.working_dir))
            || operation
                .target_path
                .as_deref()
                .is_some_and(|t| paths::is_test_path(&paths::normalize(t, &snapshot.working_dir))),
    );
    set(Predicate::UserRequested, operation.flag("user_requested"));
    set(Predicate::RepeatedOperation, is_repeated(operation, snapshot));
    set(Predicate::Ci, snapshot.is_ci);
    set(Predicate::RemoteSession, snapshot.is_remote_session);
    set(Predicate::Container, snapshot.is_container);
    set(Predicate::RecentMistake, trust.recent_mistake);
    set(Predicate::OffHours, off_hours.contains(snapshot.time_of_day));
    set(Predicate::Elevated, is_elevated(operation));
    set(Predicate::Reversible, rule_reversible || operation.flag("reversible"));
    set(Predicate::HasBackup, operation.flag("has_backup"));
    set(
        Predicate::SystemPath,
        mutates(operation) && targets.iter().any(|p| paths::is_system_path(p)),
    );
    set(Predicate::TransmitsExternally, transmits_externally(operation));
    set(Predicate::PreviouslyApproved, trust.previously_approved);

    held
}

fn is_repeated(operation: &Operation, snapshot: &ContextSnapshot) -> bool {
    let key = pattern_key(operation);
    snapshot.history().iter().any(|earlier| pattern_key(earlier) == key)
}

pub fn is_elevated(operation: &Operation) -> bool {
    operation.flag("elevated") || operation.command_line().is_some_and(|c| c.is_elevated())
}

/// Whether the operation can change what it names (as opposed to only reading it).
pub fn mutates(operation: &Operation) -> bool {
    match operation.kind {
        OperationKind::FileRead | OperationKind::NetworkFetch => false,
        OperationKind::Shell => operation.command_line().is_none_or(|cmd| {
            !cmd.redirect_targets.is_empty()
                || cmd
                    .segments
                    .iter()
                    .any(|s| !READ_ONLY_PROGRAMS.contains(&s.program.as_str()) || s.has_arg("-delete"))
        }),
        _ => true,
    }
}

/// Whether the operation sends data to another machine.
pub fn transmits_externally(operation: &Operation) -> bool {
    match operation.kind {
        OperationKind::NetworkFetch => !operation.url_host().is_some_and(|h| is_loopback(&h)),
        OperationKind::Shell => operation.command_line().is_some_and(|cmd| {
            cmd.segments.iter().any(|s| {
                TRANSMITTING_PROGRAMS.contains(&s.program.as_str())
                    || (s.program == "git" && s.subcommand() == Some("push"))
            })
        }),
        OperationKind::ToolCall => operation.tool_name.as_deref().is_some_and(|name| {
            let name = name.to_ascii_lowercase();
            TRANSMITTING_TOOLS.iter().any(|t| name.contains(t))
        }),
        _ => false,
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "[::1]" | "::1") || host.starts_with("127.")
}
