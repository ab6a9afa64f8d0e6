//! The policy engine: rule evaluation, compound risk and mode mapping
//! combined into a [`Decision`].

use std::sync::Arc;

use tracing::debug;

use warden_config::WardenConfig;
use warden_core::{Action, Decision, Operation, Recoverability, RiskScore};

use crate::context::ContextSnapshot;
use crate::correlator::Correlator;
use crate::mode::{ModeController, ModeState};
use crate::predicate::{OffHours, Predicate};
use crate::rules::{Contribution, RuleBook};
use crate::trust::TrustLedger;

/// Reason attached when a confirmed operation could not be checkpointed.
pub const NO_CHECKPOINT_REASON: &str = "no recovery checkpoint available";

/// An external scorer (threat feed, learned model) consulted on every decision.
///
/// The hint is added to the score like any other contribution.
pub trait RiskAdvisor: Send + Sync {
    fn name(&self) -> &str;

    fn score_hint(&self, operation: &Operation, snapshot: &ContextSnapshot) -> i32;
}

/// Turns an operation and its context into a decision. Holds no per-session state.
#[derive(Clone)]
pub struct PolicyEngine {
    book: Arc<RuleBook>,
    modes: ModeController,
    off_hours: OffHours,
    advisor: Option<Arc<dyn RiskAdvisor>>,
    recovery: Option<Arc<dyn Recoverability>>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("rules", &self.book.rules().count())
            .field("sequences", &self.book.sequences().len())
            .field("off_hours", &self.off_hours)
            .field("advisor", &self.advisor.as_ref().map(|a| a.name().to_string()))
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

impl PolicyEngine {
    pub fn new(book: Arc<RuleBook>, modes: ModeController, off_hours: OffHours) -> Self {
        Self {
            book,
            modes,
            off_hours,
            advisor: None,
            recovery: None,
        }
    }

    pub fn from_config(config: &WardenConfig, book: Arc<RuleBook>) -> Self {
        let off_hours = OffHours {
            start: config.modes.off_hours_start,
            end: config.modes.off_hours_end,
        };
        Self::new(book, ModeController::new(config.modes.clone()), off_hours)
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn RiskAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    #[must_use]
    pub fn with_recoverability(mut self, recovery: Arc<dyn Recoverability>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn rule_book(&self) -> &RuleBook {
        &self.book
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    /// Score `operation` and pick an action.
    ///
    /// Reads the ledger and mode without changing them; the same inputs
    /// always give the same decision. `snapshot.recent_operations` must
    /// already end with `operation`.
    pub fn evaluate(
        &self,
        operation: &Operation,
        snapshot: &ContextSnapshot,
        ledger: &TrustLedger,
        mode: &ModeState,
    ) -> Decision {
        let trust = ledger.signals(operation, snapshot.captured_at);
        let eval = self.book.base_risk(operation, snapshot, trust, self.off_hours);
        let compound =
            Correlator::new(&self.book).compound_risk(&snapshot.recent_operations, &snapshot.working_dir);

        let mut contributions = eval.contributions.clone();
        for m in &compound.matched {
            contributions.push(Contribution::new(format!("sequence: {}", m.label), m.risk));
        }
        // The summed sequence risk is capped; the per-pattern reasons are not.
        let mut raw = eval.score + compound.extra;

        if let Some(advisor) = &self.advisor {
            let hint = advisor.score_hint(operation, snapshot);
            if hint != 0 {
                raw += hint;
                contributions.push(Contribution::new(format!("advisor: {}", advisor.name()), hint));
            }
        }

        let risk_score = RiskScore::clamped(raw);
        let touches_system_path = eval.predicates.contains(&Predicate::SystemPath);
        let action = self
            .modes
            .action_for(mode, risk_score.value(), touches_system_path);

        // Stable sort keeps evaluation order among equal weights.
        contributions.sort_by_key(|c| std::cmp::Reverse(c.weight.abs()));
        let mut reasons: Vec<String> = contributions
            .iter()
            .map(|c| format!("{} ({:+})", c.label, c.weight))
            .collect();
        reasons.extend(snapshot.degraded.iter().map(ToString::to_string));

        if action >= Action::QuickConfirm
            && let Some(recovery) = &self.recovery
            && !recovery.supports(operation)
        {
            reasons.push(NO_CHECKPOINT_REASON.to_string());
        }

        let alternatives = if action == Action::Allow {
            Vec::new()
        } else {
            eval.alternatives
        };

        debug!(
            score = risk_score.value(),
            %action,
            mode = %mode.kind(),
            rules = ?eval.matched_rule_ids,
            sequences = compound.matched.len(),
            "operation evaluated"
        );

        Decision {
            risk_score,
            action,
            reasons,
            alternatives,
            matched_rules: eval.matched_rule_ids,
            matched_sequences: compound.matched_ids(),
            mode: mode.kind(),
        }
    }
}
