//! Checkpoint strategies: which operations each one covers and how it
//! captures their targets.

use std::path::{Path, PathBuf};

use warden_core::{CommandSegment, Operation, OperationKind, Result, WardenError};

use crate::checkpoint::{Payload, StrategyKind};
use crate::fs::{self, FileEntry};
use crate::git::RefCapture;

/// A way of capturing enough state to undo an operation.
pub trait CheckpointStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy covers the operation. Looks at its shape only.
    fn applies(&self, operation: &Operation) -> bool;

    /// Capture the state the operation is about to change.
    fn capture(&self, operation: &Operation, cwd: &Path, max_bytes: u64) -> Result<Payload>;
}

/// Strategies in priority order; the first that applies wins.
pub fn default_strategies() -> Vec<Box<dyn CheckpointStrategy>> {
    vec![
        Box::new(FileArchive),
        Box::new(GitRefPointer),
        Box::new(ConfigCopy),
    ]
}

// ── File archive ───────────────────────────────────────────────

const DELETING_PROGRAMS: &[&str] = &["rm", "unlink", "rmdir", "shred"];

/// Archives files and directories an operation deletes.
pub struct FileArchive;

impl FileArchive {
    fn targets(operation: &Operation) -> Vec<String> {
        if operation.is_delete() {
            return operation.target_path.iter().cloned().collect();
        }
        operation
            .command_line()
            .map(|cmd| {
                cmd.segments
                    .iter()
                    .filter(|s| DELETING_PROGRAMS.contains(&s.program.as_str()))
                    .flat_map(|s| s.positional_args())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CheckpointStrategy for FileArchive {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FileArchive
    }

    fn applies(&self, operation: &Operation) -> bool {
        !Self::targets(operation).is_empty()
    }

    fn capture(&self, operation: &Operation, cwd: &Path, max_bytes: u64) -> Result<Payload> {
        let mut entries = Vec::new();
        let mut budget = max_bytes;
        for target in Self::targets(operation) {
            fs::capture_tree(&fs::resolve(&target, cwd), &mut entries, &mut budget)?;
        }
        Ok(Payload::Files { entries })
    }
}

// ── Git ref pointer ────────────────────────────────────────────

/// Records HEAD and branch pointers before history-rewriting git commands.
pub struct GitRefPointer;

impl GitRefPointer {
    fn rewrites_history(seg: &CommandSegment) -> bool {
        if seg.program != "git" {
            return false;
        }
        match seg.subcommand() {
            Some("reset" | "rebase" | "merge" | "pull" | "cherry-pick") => true,
            Some("commit") => seg.has_flag(None, Some("amend")),
            Some("branch") => seg.has_flag(Some('D'), None) || seg.has_flag(Some('f'), Some("force")),
            Some("checkout" | "switch") => seg.has_flag(Some('B'), None) || seg.has_flag(Some('C'), None),
            _ => false,
        }
    }

    /// Branch names the command names explicitly, e.g. `x` in `git branch -D x`.
    fn named_branches(seg: &CommandSegment) -> Vec<String> {
        match seg.subcommand() {
            Some("branch" | "checkout" | "switch") => seg
                .positional_args()
                .into_iter()
                .skip(1)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl CheckpointStrategy for GitRefPointer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GitRefPointer
    }

    fn applies(&self, operation: &Operation) -> bool {
        operation
            .command_line()
            .is_some_and(|cmd| cmd.segments.iter().any(Self::rewrites_history))
    }

    fn capture(&self, operation: &Operation, cwd: &Path, _max_bytes: u64) -> Result<Payload> {
        let branches: Vec<String> = operation
            .command_line()
            .map(|cmd| {
                cmd.segments
                    .iter()
                    .filter(|s| Self::rewrites_history(s))
                    .flat_map(Self::named_branches)
                    .collect()
            })
            .unwrap_or_default();
        let refs: Vec<&str> = branches.iter().map(String::as_str).collect();
        Ok(Payload::GitRefs(RefCapture::take(cwd, &refs)?))
    }
}

// ── Config copy ────────────────────────────────────────────────

/// Copies files an operation rewrites in place.
pub struct ConfigCopy;

impl ConfigCopy {
    fn targets(operation: &Operation) -> Vec<String> {
        match operation.kind {
            OperationKind::FileWrite if !operation.is_delete() => {
                operation.target_path.iter().cloned().collect()
            }
            OperationKind::Shell => {
                let Some(cmd) = operation.command_line() else {
                    return Vec::new();
                };
                let mut out: Vec<String> = cmd.redirect_targets.clone();
                for seg in cmd.segments.iter().filter(|s| is_sed_in_place(s)) {
                    out.extend(sed_files(seg));
                }
                out.retain(|t| t != "/dev/null");
                out
            }
            _ => Vec::new(),
        }
    }
}

fn is_sed_in_place(seg: &CommandSegment) -> bool {
    seg.program == "sed" && seg.has_flag(Some('i'), Some("in-place"))
}

/// File operands of a sed invocation. Without `-e`/`-f` the first operand is the script.
fn sed_files(seg: &CommandSegment) -> Vec<String> {
    let mut files = Vec::new();
    let mut explicit_script = false;
    let mut args = seg.args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-e" | "--expression" | "-f" | "--file" => {
                explicit_script = true;
                args.next();
            }
            a if a.starts_with("--expression=") || a.starts_with("--file=") => {
                explicit_script = true;
            }
            a if a.starts_with('-') => {}
            a => files.push(a.to_string()),
        }
    }
    if !explicit_script && !files.is_empty() {
        files.remove(0);
    }
    files
}

impl CheckpointStrategy for ConfigCopy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ConfigCopy
    }

    fn applies(&self, operation: &Operation) -> bool {
        !Self::targets(operation).is_empty()
    }

    fn capture(&self, operation: &Operation, cwd: &Path, max_bytes: u64) -> Result<Payload> {
        let mut budget = max_bytes;
        let mut seen: Vec<PathBuf> = Vec::new();
        let mut entries: Vec<FileEntry> = Vec::new();
        for target in Self::targets(operation) {
            let path = fs::resolve(&target, cwd);
            if seen.contains(&path) {
                continue;
            }
            entries.push(fs::capture_file_or_missing(&path, &mut budget)?);
            seen.push(path);
        }
        if entries.is_empty() {
            return Err(WardenError::CheckpointFailed("no files to copy".into()));
        }
        Ok(Payload::Files { entries })
    }
}
