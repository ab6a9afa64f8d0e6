//! Operating modes and their score → action tables.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use warden_config::{ModesConfig, ThresholdsConfig};
use warden_core::{Action, ModeKind, Result, WardenError};

/// The active mode of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeState {
    Learning {
        started_at: DateTime<Utc>,
        days_observed: u32,
    },
    Adaptive,
    Flow {
        expires_at: DateTime<Utc>,
    },
    Paranoid,
}

impl ModeState {
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Learning { .. } => ModeKind::Learning,
            Self::Adaptive => ModeKind::Adaptive,
            Self::Flow { .. } => ModeKind::Flow,
            Self::Paranoid => ModeKind::Paranoid,
        }
    }
}

/// A mode change, for logging and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: ModeKind,
    pub to: ModeKind,
}

/// Minimum score for each action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub hint: i32,
    pub quick_confirm: i32,
    pub explain: i32,
    pub block: i32,
}

impl From<ThresholdsConfig> for ThresholdTable {
    fn from(t: ThresholdsConfig) -> Self {
        Self {
            hint: t.hint,
            quick_confirm: t.quick_confirm,
            explain: t.explain,
            block: t.block,
        }
    }
}

impl ThresholdTable {
    #[must_use]
    pub fn shifted(self, by: i32) -> Self {
        Self {
            hint: self.hint + by,
            quick_confirm: self.quick_confirm + by,
            explain: self.explain + by,
            block: self.block + by,
        }
    }

    /// Look up the action for a score. Scores under the hint threshold are
    /// allowed silently unless `show_low_risk_hints` is set.
    pub fn action_for(&self, score: u8, show_low_risk_hints: bool) -> Action {
        let s = i32::from(score);
        if s >= self.block {
            Action::Block
        } else if s >= self.explain {
            Action::ExplainAndConfirm
        } else if s >= self.quick_confirm {
            Action::QuickConfirm
        } else if s >= self.hint || show_low_risk_hints {
            Action::HintOnly
        } else {
            Action::Allow
        }
    }
}

/// Drives mode transitions and maps scores to actions.
#[derive(Debug, Clone)]
pub struct ModeController {
    config: ModesConfig,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(ModesConfig::default())
    }
}

impl ModeController {
    pub fn new(config: ModesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModesConfig {
        &self.config
    }

    /// Learning for a brand-new identity, Adaptive when history exists.
    pub fn initial(&self, has_history: bool, now: DateTime<Utc>) -> ModeState {
        if has_history {
            ModeState::Adaptive
        } else {
            ModeState::Learning {
                started_at: now,
                days_observed: 0,
            }
        }
    }

    /// Apply time-driven transitions. Called at the start of every evaluation.
    pub fn tick(&self, state: &mut ModeState, now: DateTime<Utc>) -> Option<ModeTransition> {
        let from = state.kind();
        match state {
            ModeState::Learning {
                started_at,
                days_observed,
            } => {
                let days = (now - *started_at).num_days().max(0);
                *days_observed = u32::try_from(days).unwrap_or(u32::MAX);
                if *days_observed >= self.config.learning_period_days {
                    *state = ModeState::Adaptive;
                }
            }
            ModeState::Flow { expires_at } if now >= *expires_at => {
                *state = ModeState::Adaptive;
            }
            _ => {}
        }
        let to = state.kind();
        (from != to).then(|| {
            info!(%from, %to, "mode changed by timer");
            ModeTransition { from, to }
        })
    }

    /// Enter Flow for `minutes` (the configured default when `None`).
    /// Re-entering Flow extends it.
    pub fn enter_flow(
        &self,
        state: &mut ModeState,
        minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<ModeTransition> {
        let from = state.kind();
        match state {
            ModeState::Adaptive | ModeState::Flow { .. } => {
                let minutes = minutes.unwrap_or(self.config.default_flow_minutes);
                *state = ModeState::Flow {
                    expires_at: now + Duration::minutes(i64::from(minutes)),
                };
                Ok(ModeTransition {
                    from,
                    to: ModeKind::Flow,
                })
            }
            _ => Err(invalid(from, ModeKind::Flow)),
        }
    }

    pub fn exit_flow(&self, state: &mut ModeState) -> Result<ModeTransition> {
        self.leave(state, ModeKind::Flow)
    }

    pub fn enter_paranoid(&self, state: &mut ModeState) -> Result<ModeTransition> {
        let from = state.kind();
        match state {
            ModeState::Adaptive | ModeState::Paranoid => {
                *state = ModeState::Paranoid;
                Ok(ModeTransition {
                    from,
                    to: ModeKind::Paranoid,
                })
            }
            _ => Err(invalid(from, ModeKind::Paranoid)),
        }
    }

    pub fn exit_paranoid(&self, state: &mut ModeState) -> Result<ModeTransition> {
        self.leave(state, ModeKind::Paranoid)
    }

    fn leave(&self, state: &mut ModeState, expected: ModeKind) -> Result<ModeTransition> {
        let from = state.kind();
        if from != expected {
            return Err(invalid(from, ModeKind::Adaptive));
        }
        *state = ModeState::Adaptive;
        Ok(ModeTransition {
            from,
            to: ModeKind::Adaptive,
        })
    }

    /// The threshold table in force for a mode.
    pub fn table(&self, state: &ModeState) -> ThresholdTable {
        let base = ThresholdTable::from(self.config.thresholds);
        match state {
            ModeState::Learning { .. } | ModeState::Adaptive => base,
            ModeState::Flow { .. } => base.shifted(self.config.flow_shift),
            ModeState::Paranoid => base.shifted(self.config.paranoid_shift),
        }
    }

    /// Map a final score to an action, applying the critical and system-path floors.
    pub fn action_for(&self, state: &ModeState, score: u8, touches_system_path: bool) -> Action {
        let mut action = self
            .table(state)
            .action_for(score, self.config.show_low_risk_hints);
        if score >= self.config.critical_floor {
            action = action.at_least(Action::ExplainAndConfirm);
        }
        if touches_system_path {
            action = action.at_least(Action::HintOnly);
        }
        action
    }
}

fn invalid(from: ModeKind, to: ModeKind) -> WardenError {
    WardenError::InvalidModeTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
