//! Single-knob convenience layer over the managed overrides file.
//!
//! `knob set` and `knob reset` edit one well-known override file rather than
//! the base config, so every adjustment stays reviewable and revertible.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};

use crate::core::document::ConfigDoc;
use crate::core::layer::parse_layer;
use crate::core::types::{KeyPath, ScalarValue};
use crate::io::config::HarnessConfig;

/// File this module owns inside the overrides directory.
pub const MANAGED_FILE: &str = "tuner_knobs.toml";

pub fn managed_path(harness: &HarnessConfig) -> PathBuf {
    harness.overrides_dir.join(MANAGED_FILE)
}

/// Where a `knob get` answer came from.
#[derive(Debug, Clone, PartialEq)]
pub enum KnobValue {
    Override(ScalarValue),
    Base(ScalarValue),
    Unset,
}

/// Read one knob: the managed override wins, otherwise fall back to base.
pub fn get(store: &Path, base: &ConfigDoc, path: &KeyPath) -> Result<KnobValue> {
    let overrides = load_store(store)?;
    if let Some(value) = overrides.get(path) {
        return Ok(KnobValue::Override(value.clone()));
    }
    match base.get(path) {
        Some(value) => Ok(KnobValue::Base(value.clone())),
        None => Ok(KnobValue::Unset),
    }
}

/// Set one knob in the managed file.
///
/// The key must already exist in the base config: the override layer can
/// retune a knob the solver knows about but never invent a new one.
pub fn set(store: &Path, base: &ConfigDoc, path: &KeyPath, value: ScalarValue) -> Result<()> {
    if !base.contains(path) {
        bail!("unknown key '{path}': not present in the base config");
    }
    let mut overrides = load_store(store)?;
    overrides.set(path, value);
    write_store(store, &overrides)
}

/// Remove one knob from the managed file, returning the override it dropped.
pub fn reset(store: &Path, path: &KeyPath) -> Result<Option<ScalarValue>> {
    let mut overrides = load_store(store)?;
    let removed = overrides.remove(path);
    if removed.is_some() {
        write_store(store, &overrides)?;
    }
    Ok(removed)
}

/// Parse the managed file into a document. Missing file means no overrides.
/// Duplicate assignments collapse last-wins, matching merge semantics.
fn load_store(store: &Path) -> Result<ConfigDoc> {
    if !store.is_file() {
        return Ok(ConfigDoc::default());
    }
    let contents = fs::read_to_string(store).with_context(|| format!("read {}", store.display()))?;
    let layer = parse_layer(&contents);
    let mut doc = ConfigDoc::default();
    for assignment in layer.assignments {
        doc.set(&assignment.path, assignment.value);
    }
    Ok(doc)
}

/// Rewrite the managed file atomically (temp file + rename).
fn write_store(store: &Path, overrides: &ConfigDoc) -> Result<()> {
    if let Some(parent) = store.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let body = format!(
        "# tuner managed overrides\n# last updated: {stamp}\n\n{}",
        overrides.render()
    );
    let tmp_path = store.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp_path, body).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, store).with_context(|| format!("replace {}", store.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::{key as path, sample_base as base};

    #[test]
    fn get_falls_back_to_base_when_no_override() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = temp.path().join("tuner_knobs.toml");
        let value = get(&store, &base(), &path("thermo.t_min")).expect("get");
        assert_eq!(value, KnobValue::Base(ScalarValue::Float(0.0008)));
    }

    #[test]
    fn set_then_get_returns_override() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = temp.path().join("tuner_knobs.toml");
        set(&store, &base(), &path("thermo.t_min"), ScalarValue::Float(0.001)).expect("set");

        let value = get(&store, &base(), &path("thermo.t_min")).expect("get");
        assert_eq!(value, KnobValue::Override(ScalarValue::Float(0.001)));

        // The other base knob is untouched by the override file.
        let other = get(&store, &base(), &path("thermo.reheat_factor")).expect("get");
        assert_eq!(other, KnobValue::Base(ScalarValue::Float(1.5)));
    }

    #[test]
    fn set_rejects_keys_missing_from_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = temp.path().join("tuner_knobs.toml");
        let err = set(
            &store,
            &base(),
            &path("thermo.invented"),
            ScalarValue::Integer(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("thermo.invented"));
        assert!(!store.exists());
    }

    #[test]
    fn reset_removes_override_and_restores_base_visibility() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = temp.path().join("tuner_knobs.toml");
        set(&store, &base(), &path("target_chromatic"), ScalarValue::Integer(85)).expect("set");

        let removed = reset(&store, &path("target_chromatic")).expect("reset");
        assert_eq!(removed, Some(ScalarValue::Integer(85)));

        let value = get(&store, &base(), &path("target_chromatic")).expect("get");
        assert_eq!(value, KnobValue::Base(ScalarValue::Integer(88)));
    }

    #[test]
    fn reset_of_absent_key_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = temp.path().join("tuner_knobs.toml");
        let removed = reset(&store, &path("thermo.t_min")).expect("reset");
        assert_eq!(removed, None);
        assert!(!store.exists());
    }

    #[test]
    fn managed_file_carries_header_and_reparses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = temp.path().join("tuner_knobs.toml");
        set(&store, &base(), &path("thermo.t_min"), ScalarValue::Float(0.002)).expect("set");

        let text = fs::read_to_string(&store).expect("read");
        assert!(text.starts_with("# tuner managed overrides\n"));
        let layer = parse_layer(&text);
        assert_eq!(layer.assignments.len(), 1);
        assert!(layer.skipped_lines.is_empty());
    }
}
