//! # warden-runtime
//!
//! The decision API hosts call. [`Warden`] ties the policy engine to
//! per-identity sessions, persistent storage, system probes and the
//! recovery coordinator.
//!
//! ```text
//!   host ──evaluate──▶ probes ─▶ snapshot ─▶ trust reset ─▶ PolicyEngine ─▶ Decision
//!   host ──authorize─▶ checkpoint (score ≥ recovery.min_risk) ─▶ Authorization
//!   host ──report────▶ TrustLedger ─▶ store
//! ```
//!
//! Every step publishes an [`Event`](warden_core::Event) on the bus
//! returned by [`Warden::subscribe`].

pub mod fallback;
pub mod probes;
pub mod session;
pub mod warden;

pub use fallback::UnavailableStore;
pub use probes::{ClockProbe, EnvironmentProbe, GitProbe, WorkingDirProbe, system_probes};
pub use session::{Session, SessionRecord};
pub use warden::{Authorization, STORE_UNAVAILABLE_REASON, Warden};
