//! # warden-policy
//!
//! The decision core of Warden. Everything in this crate is synchronous and
//! deterministic except probe gathering in [`context::gather`].
//!
//! - [`context`]: probe facts, fail-closed snapshot assembly, the operation window
//! - [`rules`]: the declarative rule book and base-risk evaluation
//! - [`correlator`]: compound risk from dangerous operation sequences
//! - [`trust`]: per-identity approvals, mistakes and resets
//! - [`mode`]: Learning / Adaptive / Flow / Paranoid and their threshold tables
//! - [`policy`]: the engine that turns all of the above into a [`Decision`](warden_core::Decision)

pub mod context;
pub mod correlator;
pub mod mode;
pub mod paths;
pub mod policy;
pub mod predicate;
pub mod rules;
pub mod trust;

pub use context::{
    ContextProbe, ContextSnapshot, Degradation, OperationWindow, ProbeFact, ProbeFailure,
    ProbeResults, SnapshotBuilder, gather,
};
pub use correlator::{CompoundRisk, Correlator, SequenceMatch};
pub use mode::{ModeController, ModeState, ModeTransition, ThresholdTable};
pub use policy::{PolicyEngine, RiskAdvisor};
pub use predicate::{OffHours, Predicate};
pub use rules::{Contribution, RuleBook, RuleEvaluation};
pub use trust::{ResetReason, TrustInfo, TrustLedger, TrustPolicy, pattern_key};
