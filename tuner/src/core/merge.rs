//! Layered merge of override layers onto a base configuration.
//!
//! The merge is existence-gated: a layer can only overwrite slots already
//! present in the working copy (from the base or an earlier layer). Unknown
//! paths are dropped with a warning so unreviewed override files cannot smuggle
//! in unsupported or misspelled options.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::document::ConfigDoc;
use crate::core::layer::ConfigLayer;
use crate::core::types::{KeyPath, ValueKind};

/// Whether override literals must match the kind of the slot they replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Baseline behavior: any well-formed literal overwrites the slot.
    #[default]
    Permissive,
    /// A replacement must parse as the same kind as the existing value;
    /// mismatches fail that one assignment, not the whole merge.
    Strict,
}

/// One non-fatal problem observed during a merge.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeWarning {
    /// Assignment targeted a path absent from the working copy.
    UnknownKey { path: KeyPath, line: usize },
    /// Strict mode rejected a kind change.
    KindMismatch {
        path: KeyPath,
        line: usize,
        expected: ValueKind,
        found: ValueKind,
    },
    /// A layer line was neither a comment nor a well-formed assignment.
    MalformedLine { line: usize },
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeWarning::UnknownKey { path, line } => {
                write!(f, "line {line}: unknown key '{path}' dropped")
            }
            MergeWarning::KindMismatch {
                path,
                line,
                expected,
                found,
            } => write!(
                f,
                "line {line}: '{path}' expects {expected} but override is {found}; dropped"
            ),
            MergeWarning::MalformedLine { line } => {
                write!(f, "line {line}: malformed line skipped")
            }
        }
    }
}

/// Outcome bookkeeping for one merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub warnings: Vec<MergeWarning>,
    /// Assignments that actually overwrote a slot.
    pub applied: usize,
}

/// Apply `layers` in order onto a working copy of `base`.
///
/// Deterministic: the same base and ordered layer list always produce an
/// identical document. Warnings never abort the merge.
pub fn merge(base: &ConfigDoc, layers: &[ConfigLayer], strictness: Strictness) -> (ConfigDoc, MergeReport) {
    let mut working = base.clone();
    let mut report = MergeReport::default();

    for layer in layers {
        for &line in &layer.skipped_lines {
            report.warnings.push(MergeWarning::MalformedLine { line });
        }
        for assignment in &layer.assignments {
            let Some(current) = working.get(&assignment.path) else {
                report.warnings.push(MergeWarning::UnknownKey {
                    path: assignment.path.clone(),
                    line: assignment.line,
                });
                continue;
            };
            if strictness == Strictness::Strict && current.kind() != assignment.value.kind() {
                report.warnings.push(MergeWarning::KindMismatch {
                    path: assignment.path.clone(),
                    line: assignment.line,
                    expected: current.kind(),
                    found: assignment.value.kind(),
                });
                continue;
            }
            working.set(&assignment.path, assignment.value.clone());
            report.applied += 1;
        }
    }

    (working, report)
}
