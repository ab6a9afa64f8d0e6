//! # warden-core
//!
//! Core types, traits, and primitives for the Warden command-risk advisory engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the operations a host proposes, the decisions Warden hands back, the unified error
//! type, and the event bus.

pub mod command;
pub mod decision;
pub mod error;
pub mod event;
pub mod operation;
pub mod recovery;
pub mod types;

pub use command::{CommandLine, CommandSegment};
pub use decision::{Action, Alternative, Decision, ModeKind, RiskScore};
pub use error::{Result, WardenError};
pub use event::{Event, EventBus};
pub use operation::{Operation, OperationKind};
pub use recovery::Recoverability;
pub use types::*;
