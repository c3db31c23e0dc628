//! Ignored-key linting for override layers.
//!
//! Some knobs are parsed by the solver but have no effect in the current
//! build; overriding them wastes a run. The linter checks every assignment in
//! a layer against a frozen set of such paths before anything is merged or
//! launched, and reports the full violation list so a user can fix all of
//! them at once.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::core::layer::ConfigLayer;
use crate::core::types::KeyPath;

/// Knobs the current solver build accepts but ignores.
pub const DEFAULT_IGNORED_KEYS: &[&str] = &[
    "use_pimc",
    "memetic.use_tsp_guidance",
    "memetic.tsp_weight",
];

/// Frozen set of paths that must never be the target of an override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoredKeySet {
    keys: BTreeSet<KeyPath>,
}

impl IgnoredKeySet {
    /// Parse dotted paths into a set. Malformed entries are errors: the set is
    /// operator-supplied configuration, not user input.
    pub fn from_paths<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = BTreeSet::new();
        for raw in paths {
            keys.insert(raw.as_ref().parse::<KeyPath>()?);
        }
        Ok(Self { keys })
    }

    pub fn builtin() -> Self {
        Self::from_paths(DEFAULT_IGNORED_KEYS).expect("builtin ignored keys are well formed")
    }

    /// Structural membership: section + key, independent of value.
    pub fn contains(&self, path: &KeyPath) -> bool {
        self.keys.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One assignment to an ignored path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: KeyPath,
    /// 1-indexed source line of the offending assignment.
    pub line: usize,
}

/// Check every assignment in `layer` against `ignored`.
///
/// Returns the full list, not just the first hit. Any non-empty result must
/// stop the calling workflow before merge or launch.
pub fn lint(layer: &ConfigLayer, ignored: &IgnoredKeySet) -> Vec<Violation> {
    layer
        .assignments
        .iter()
        .filter(|assignment| ignored.contains(&assignment.path))
        .map(|assignment| Violation {
            path: assignment.path.clone(),
            line: assignment.line,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layer::parse_layer;

    #[test]
    fn clean_layer_passes_with_zero_violations() {
        let layer = parse_layer("target_chromatic = 88\n[thermo]\nsteps_per_temp = 20000\n");
        assert!(lint(&layer, &IgnoredKeySet::builtin()).is_empty());
    }

    #[test]
    fn every_ignored_assignment_is_named() {
        let layer = parse_layer(
            "use_pimc = true\n[memetic]\nuse_tsp_guidance = true\ntsp_weight = 0.3\n",
        );
        let violations = lint(&layer, &IgnoredKeySet::builtin());
        let named: Vec<String> = violations
            .iter()
            .map(|violation| violation.path.to_string())
            .collect();
        assert_eq!(
            named,
            vec!["use_pimc", "memetic.use_tsp_guidance", "memetic.tsp_weight"]
        );
        assert_eq!(violations[0].line, 1);
    }

    #[test]
    fn membership_is_structural_not_value_based() {
        let enabled = parse_layer("use_pimc = true\n");
        let disabled = parse_layer("use_pimc = false\n");
        let ignored = IgnoredKeySet::builtin();
        assert_eq!(lint(&enabled, &ignored).len(), 1);
        assert_eq!(lint(&disabled, &ignored).len(), 1);
    }

    #[test]
    fn custom_sets_parse_from_config_strings() {
        let ignored = IgnoredKeySet::from_paths(["gpu.device_id"]).expect("parse");
        let layer = parse_layer("[gpu]\ndevice_id = 1\nbatch_size = 4096\n");
        let violations = lint(&layer, &ignored);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path.to_string(), "gpu.device_id");
    }

    #[test]
    fn malformed_set_entries_are_rejected() {
        assert!(IgnoredKeySet::from_paths(["bad..path"]).is_err());
    }
}
