//! Compound risk from dangerous sequences of operations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_core::Operation;

use crate::rules::{CompiledSequence, RuleBook};

/// One sequence pattern found in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMatch {
    pub id: String,
    pub label: String,
    pub risk: i32,
}

/// Extra risk contributed by completed sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundRisk {
    /// Sum of matched pattern risks, clamped to 0-10.
    pub extra: i32,
    pub matched: Vec<SequenceMatch>,
}

impl CompoundRisk {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn matched_ids(&self) -> Vec<String> {
        self.matched.iter().map(|m| m.id.clone()).collect()
    }
}

/// Matches the rule book's sequence patterns against an operation window.
#[derive(Debug, Clone, Copy)]
pub struct Correlator<'a> {
    sequences: &'a [CompiledSequence],
}

impl<'a> Correlator<'a> {
    pub fn new(book: &'a RuleBook) -> Self {
        Self {
            sequences: book.sequences(),
        }
    }

    /// Find every pattern the window completes.
    ///
    /// `window` is oldest first and its last element is the operation being
    /// evaluated. A pattern counts only when its final step matches that
    /// operation; earlier steps may be separated by unrelated operations.
    pub fn compound_risk(&self, window: &[Operation], cwd: &str) -> CompoundRisk {
        let Some((newest, earlier)) = window.split_last() else {
            return CompoundRisk::default();
        };

        let mut out = CompoundRisk::default();
        let mut sum = 0i32;
        for seq in self.sequences {
            if completes(seq, newest, earlier, cwd) {
                debug!(pattern = %seq.pattern.id, risk = seq.pattern.risk, "sequence matched");
                sum += seq.pattern.risk;
                out.matched.push(SequenceMatch {
                    id: seq.pattern.id.clone(),
                    label: seq.pattern.label.clone(),
                    risk: seq.pattern.risk,
                });
            }
        }
        out.extra = sum.clamp(0, 10);
        out
    }
}

fn completes(seq: &CompiledSequence, newest: &Operation, earlier: &[Operation], cwd: &str) -> bool {
    if seq.is_empty() {
        return false;
    }
    let last = seq.len() - 1;
    if !seq.step_matches(last, newest, cwd) {
        return false;
    }
    // Walk backwards: the latest op matching each earlier step keeps the
    // most room for the steps before it.
    let mut remaining = last;
    for op in earlier.iter().rev() {
        if remaining == 0 {
            break;
        }
        if seq.step_matches(remaining - 1, op, cwd) {
            remaining -= 1;
        }
    }
    remaining == 0
}
