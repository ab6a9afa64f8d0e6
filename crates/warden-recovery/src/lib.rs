//! # warden-recovery
//!
//! Checkpoints taken before a risky operation is allowed to run, and the
//! means to undo it afterwards.
//!
//! Three strategies are tried in order:
//!
//! 1. **File archive**: `rm`, `unlink`, `rmdir`, `shred` and file deletes.
//!    Contents are stored base64-encoded; system paths and oversized trees
//!    are refused.
//! 2. **Git ref pointer**: HEAD and branch pointers before `reset`,
//!    `rebase`, `commit --amend`, `branch -D` and friends.
//! 3. **Config copy**: files rewritten in place by a file write, `sed -i`
//!    or `>` redirection.

pub mod checkpoint;
pub mod coordinator;
pub mod fs;
pub mod git;
pub mod strategy;

pub use checkpoint::{Payload, RecoveryCheckpoint, StrategyKind};
pub use coordinator::RecoveryCoordinator;
pub use strategy::CheckpointStrategy;
