//! Heuristic next-configuration advisor.
//!
//! The advisor is a recommendation loop, not an optimizer: it looks at which
//! parameter changes coincided with improvements in past runs and proposes
//! nudging those parameters further in the same direction. Suggestions are
//! written out for human review and never applied automatically.

use crate::core::summary::RunRecord;
use crate::core::types::{KeyPath, ScalarValue};

/// One proposed assignment, with the evidence that motivated it.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedChange {
    pub path: KeyPath,
    pub value: ScalarValue,
    pub reason: String,
}

/// A candidate override layer derived from run history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggestion {
    pub changes: Vec<SuggestedChange>,
}

impl Suggestion {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Pluggable advisor heuristic.
///
/// History is ordered oldest-first. Implementations must be deterministic for
/// a given history so repeated `advise` invocations agree.
pub trait Strategy {
    fn name(&self) -> &'static str;
    fn advise(&self, history: &[RunRecord]) -> Suggestion;
}

/// Shipped heuristic: continue recent changes that coincided with improvement.
///
/// For each consecutive pair of runs with known best colors and recorded
/// configs, if the later run improved (fewer colors), every numeric parameter
/// that changed between the two is proposed to move once more by the same
/// delta. More recent evidence wins when pairs disagree on a parameter.
#[derive(Debug, Clone)]
pub struct NudgeStrategy {
    /// Cap on proposed changes, most recent evidence first.
    pub max_changes: usize,
}

impl Default for NudgeStrategy {
    fn default() -> Self {
        Self { max_changes: 3 }
    }
}

impl Strategy for NudgeStrategy {
    fn name(&self) -> &'static str {
        "nudge"
    }

    fn advise(&self, history: &[RunRecord]) -> Suggestion {
        let mut changes: Vec<SuggestedChange> = Vec::new();

        // Walk newest pair first so recent evidence takes precedence.
        for pair in history.windows(2).rev() {
            let (prev, cur) = (&pair[0], &pair[1]);
            let (Some(prev_best), Some(cur_best)) =
                (prev.summary.best_colors, cur.summary.best_colors)
            else {
                continue;
            };
            if cur_best >= prev_best || prev.active_config.is_empty() || cur.active_config.is_empty()
            {
                continue;
            }

            for (key, cur_value) in &cur.active_config {
                if changes.len() >= self.max_changes {
                    break;
                }
                if changes.iter().any(|change| change.path.to_string() == *key) {
                    continue;
                }
                let Some(prev_value) = prev.active_config.get(key) else {
                    continue;
                };
                let Some(next) = nudge(prev_value, cur_value) else {
                    continue;
                };
                let Ok(path) = key.parse::<KeyPath>() else {
                    continue;
                };
                changes.push(SuggestedChange {
                    path,
                    value: next,
                    reason: format!(
                        "best {prev_best} -> {cur_best} when {key} went {prev_value} -> {cur_value}"
                    ),
                });
            }
            if changes.len() >= self.max_changes {
                break;
            }
        }

        // Deterministic output order regardless of discovery order.
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Suggestion { changes }
    }
}

/// Extrapolate one more step in the direction of `prev -> cur`.
///
/// Only same-kind numeric changes are extrapolated; kind changes, booleans,
/// strings, and unchanged values yield nothing.
fn nudge(prev: &ScalarValue, cur: &ScalarValue) -> Option<ScalarValue> {
    match (prev, cur) {
        (ScalarValue::Integer(prev), ScalarValue::Integer(cur)) if prev != cur => {
            Some(ScalarValue::Integer(cur.checked_add(cur.checked_sub(*prev)?)?))
        }
        (ScalarValue::Float(prev), ScalarValue::Float(cur)) if prev != cur => {
            let next = cur + (cur - prev);
            next.is_finite().then_some(ScalarValue::Float(next))
        }
        _ => None,
    }
}
