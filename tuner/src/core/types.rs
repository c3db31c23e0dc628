//! Shared deterministic types for the configuration and run-record model.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Dotted address of one scalar slot in the configuration namespace.
///
/// Top-level keys (no section) have an empty `section`. Nested sections use
/// dotted section names, so `a.b.c` addresses key `c` in section `a.b`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPath {
    pub section: String,
    pub key: String,
}

impl KeyPath {
    pub fn new(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
        }
    }

    /// Top-level key with no section.
    pub fn top_level(key: impl Into<String>) -> Self {
        Self::new("", key)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.section.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}.{}", self.section, self.key)
        }
    }
}

impl FromStr for KeyPath {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("empty key path"));
        }
        if raw.starts_with('.') || raw.ends_with('.') || raw.contains("..") {
            return Err(anyhow!("malformed key path '{raw}'"));
        }
        match raw.rsplit_once('.') {
            Some((section, key)) => Ok(Self::new(section, key)),
            None => Ok(Self::top_level(raw)),
        }
    }
}

/// Kind tag for [`ScalarValue`], used for type-gated overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Integer,
    Float,
    Boolean,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::String => "string",
        };
        write!(f, "{name}")
    }
}

/// Typed scalar stored at one [`KeyPath`].
///
/// The kind of a slot is fixed by the base configuration; strict merges refuse
/// overrides whose literal parses as a different kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ScalarValue::Integer(_) => ValueKind::Integer,
            ScalarValue::Float(_) => ValueKind::Float,
            ScalarValue::Boolean(_) => ValueKind::Boolean,
            ScalarValue::String(_) => ValueKind::String,
        }
    }

    /// Parse a TOML-style scalar literal.
    ///
    /// Unquoted `true`/`false` are booleans, unquoted numerics are integers or
    /// floats, double-quoted text is a string. Anything else is malformed and
    /// yields `None`.
    pub fn parse_literal(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw == "true" {
            return Some(ScalarValue::Boolean(true));
        }
        if raw == "false" {
            return Some(ScalarValue::Boolean(false));
        }
        if let Some(quoted) = parse_quoted(raw) {
            return Some(ScalarValue::String(quoted));
        }
        if let Ok(int) = raw.parse::<i64>() {
            return Some(ScalarValue::Integer(int));
        }
        if let Ok(float) = raw.parse::<f64>() {
            if float.is_finite() {
                return Some(ScalarValue::Float(float));
            }
        }
        None
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(int) => Some(*int as f64),
            ScalarValue::Float(float) => Some(*float),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    /// Renders the value as a TOML literal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(int) => write!(f, "{int}"),
            ScalarValue::Float(float) => {
                if float.fract() == 0.0 && float.abs() < 1e16 {
                    write!(f, "{float:.1}")
                } else {
                    write!(f, "{float}")
                }
            }
            ScalarValue::Boolean(flag) => write!(f, "{flag}"),
            ScalarValue::String(text) => {
                write!(f, "\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

fn parse_quoted(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next()? {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        } else if ch == '"' {
            // Unescaped quote inside the literal: malformed.
            return None;
        } else {
            out.push(ch);
        }
    }
    Some(out)
}

/// Terminal status of one solver execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// A well-formed final-result marker was observed.
    Completed,
    /// The watchdog killed the run at the wall-clock deadline.
    TimedOut,
    /// The solver exited abnormally without a final-result marker.
    Crashed,
    /// Nothing conclusive could be determined from the log or exit state.
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Completed => "completed",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Crashed => "crashed",
            RunStatus::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}
