//! In-memory structured configuration document.
//!
//! Replaces line-oriented text rewriting of config files with an explicit
//! section -> key -> typed value model and get/set-by-path operations. Render
//! order is deterministic (top-level keys first, then sections, everything
//! sorted) so repeated merges of the same inputs are byte-identical.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

use crate::core::types::{KeyPath, ScalarValue};

/// Section -> key -> scalar mapping. Top-level keys live under the empty
/// section name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDoc {
    sections: BTreeMap<String, BTreeMap<String, ScalarValue>>,
}

impl ConfigDoc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document into the scalar universe.
    ///
    /// Tables become sections (nested tables flatten into dotted section
    /// names). Non-scalar values (arrays, datetimes) have no slot in the model
    /// and are rejected: the base configuration defines the tunable universe
    /// and must consist of scalars only.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = text.parse().map_err(|err| anyhow!("parse toml: {err}"))?;
        let mut doc = ConfigDoc::new();
        flatten_table("", &table, &mut doc)?;
        Ok(doc)
    }

    pub fn contains(&self, path: &KeyPath) -> bool {
        self.get(path).is_some()
    }

    pub fn get(&self, path: &KeyPath) -> Option<&ScalarValue> {
        self.sections.get(&path.section)?.get(&path.key)
    }

    /// Insert or overwrite one slot, returning the previous value.
    pub fn set(&mut self, path: &KeyPath, value: ScalarValue) -> Option<ScalarValue> {
        self.sections
            .entry(path.section.clone())
            .or_default()
            .insert(path.key.clone(), value)
    }

    /// Remove one slot, returning the removed value. Empty sections are
    /// dropped so render output never contains bare headers.
    pub fn remove(&mut self, path: &KeyPath) -> Option<ScalarValue> {
        let section = self.sections.get_mut(&path.section)?;
        let removed = section.remove(&path.key);
        if section.is_empty() {
            self.sections.remove(&path.section);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    /// Iterate all slots in render order.
    pub fn iter(&self) -> impl Iterator<Item = (KeyPath, &ScalarValue)> {
        self.sections.iter().flat_map(|(section, keys)| {
            keys.iter()
                .map(|(key, value)| (KeyPath::new(section.clone(), key.clone()), value))
        })
    }

    /// Flatten into a dotted-path map, used for run-record snapshots.
    pub fn flatten(&self) -> BTreeMap<String, ScalarValue> {
        self.iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect()
    }

    /// Render to canonical TOML text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(top) = self.sections.get("") {
            for (key, value) in top {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        for (section, keys) in &self.sections {
            if section.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{section}]\n"));
            for (key, value) in keys {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, doc: &mut ConfigDoc) -> Result<()> {
    for (key, value) in table {
        match value {
            toml::Value::Table(inner) => {
                let section = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_table(&section, inner, doc)?;
            }
            other => {
                let path = KeyPath::new(prefix, key.clone());
                let scalar = scalar_from_toml(other)
                    .ok_or_else(|| anyhow!("non-scalar value at '{path}'"))?;
                doc.set(&path, scalar);
            }
        }
    }
    Ok(())
}

fn scalar_from_toml(value: &toml::Value) -> Option<ScalarValue> {
    match value {
        toml::Value::Integer(int) => Some(ScalarValue::Integer(*int)),
        toml::Value::Float(float) => Some(ScalarValue::Float(*float)),
        toml::Value::Boolean(flag) => Some(ScalarValue::Boolean(*flag)),
        toml::Value::String(text) => Some(ScalarValue::String(text.clone())),
        _ => None,
    }
}
