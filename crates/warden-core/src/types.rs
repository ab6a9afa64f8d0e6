use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

/// Scope key for trust and mode state, e.g. `"alice@/home/alice/project"`.
pub type Identity = String;

/// Unique identifier for a recovery checkpoint.
pub type CheckpointId = Uuid;

/// Normalised key under which approvals and mistakes are recorded.
pub type PatternKey = String;

/// Lowest risk score Warden will ever report.
pub const MIN_RISK: u8 = 1;

/// Highest risk score Warden will ever report.
pub const MAX_RISK: u8 = 10;

/// Longest retention or cool-down Warden will schedule: 100 years.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// `now` plus `secs`, with `secs` capped at [`MAX_DURATION_SECS`].
pub fn after_secs(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let capped = i64::try_from(secs.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    TimeDelta::try_seconds(capped)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
