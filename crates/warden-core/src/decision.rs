use serde::{Deserialize, Serialize};
use std::fmt;

use crate::operation::Operation;
use crate::types::{MAX_RISK, MIN_RISK};

/// A risk score on the 1-10 scale. Construction always clamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(u8);

impl RiskScore {
    /// Clamp any signed sum of contributions onto the 1-10 scale.
    pub fn clamped(raw: i32) -> Self {
        Self(raw.clamp(MIN_RISK as i32, MAX_RISK as i32) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

/// What the host should do with an operation. Ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Proceed silently.
    Allow,
    /// Proceed, showing a short hint.
    HintOnly,
    /// Ask for a one-key confirmation.
    QuickConfirm,
    /// Explain the risk and ask for an explicit confirmation.
    ExplainAndConfirm,
    /// Do not run.
    Block,
}

impl Action {
    /// Whether the host has to get a human answer before executing.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::QuickConfirm | Self::ExplainAndConfirm)
    }

    /// Raise this action to `floor` if it is less restrictive.
    pub fn at_least(self, floor: Action) -> Action {
        std::cmp::max(self, floor)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::HintOnly => "hint",
            Self::QuickConfirm => "quick-confirm",
            Self::ExplainAndConfirm => "explain-and-confirm",
            Self::Block => "block",
        })
    }
}

/// Label for the operating mode a decision was made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Learning,
    Adaptive,
    Flow,
    Paranoid,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Learning => "learning",
            Self::Adaptive => "adaptive",
            Self::Flow => "flow",
            Self::Paranoid => "paranoid",
        })
    }
}

/// A safer way to reach the same goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub description: String,
    pub replacement: Operation,
}

/// The verdict for one evaluated operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub risk_score: RiskScore,
    pub action: Action,
    /// Contributing factors, largest contribution first.
    pub reasons: Vec<String>,
    pub alternatives: Vec<Alternative>,
    /// Ids of every rule that matched, winning rule first.
    #[serde(default)]
    pub matched_rules: Vec<String>,
    /// Ids of tool-sequence patterns that fired.
    #[serde(default)]
    pub matched_sequences: Vec<String>,
    pub mode: ModeKind,
}

impl Decision {
    pub fn score(&self) -> u8 {
        self.risk_score.value()
    }

    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (risk {}, {} mode)", self.action, self.risk_score, self.mode)
    }
}
