//! Lenient line scanner for override layers.
//!
//! Override files are hand-edited, so the scanner is forgiving: comments and
//! malformed lines are skipped (and counted), `[section]` headers set the
//! context for bare keys, dotted keys resolve absolutely, and later
//! assignments to the same path win at merge time.

use crate::core::types::{KeyPath, ScalarValue};

/// One `key = value` assignment read from a layer file.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub path: KeyPath,
    pub value: ScalarValue,
    /// 1-indexed source line, for diagnostics.
    pub line: usize,
}

/// Ordered assignments from one override source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayer {
    pub assignments: Vec<Assignment>,
    /// 1-indexed lines that were neither blank, comment, header, nor a
    /// well-formed assignment.
    pub skipped_lines: Vec<usize>,
}

/// Parse override text into a [`ConfigLayer`]. Never fails.
pub fn parse_layer(text: &str) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut section = String::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            match parse_section_header(line) {
                Some(name) => section = name,
                None => layer.skipped_lines.push(line_no),
            }
            continue;
        }

        let Some((key_part, value_part)) = line.split_once('=') else {
            layer.skipped_lines.push(line_no);
            continue;
        };

        let Some(path) = resolve_key(key_part.trim(), &section) else {
            layer.skipped_lines.push(line_no);
            continue;
        };

        match ScalarValue::parse_literal(&strip_trailing_comment(value_part)) {
            Some(value) => layer.assignments.push(Assignment {
                path,
                value,
                line: line_no,
            }),
            None => layer.skipped_lines.push(line_no),
        }
    }

    layer
}

fn parse_section_header(line: &str) -> Option<String> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() || !inner.chars().all(is_path_char) {
        return None;
    }
    Some(inner.to_string())
}

/// Bare keys resolve against the current section; dotted keys are absolute.
fn resolve_key(key: &str, section: &str) -> Option<KeyPath> {
    if key.is_empty() || !key.chars().all(is_path_char) {
        return None;
    }
    if key.contains('.') {
        return key.parse().ok();
    }
    Some(KeyPath::new(section, key))
}

fn is_path_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.'
}

/// Drop a trailing `# comment` from an assignment value. Quoted strings keep
/// everything up to their closing quote; only a comment may follow it, so
/// non-comment trailing garbage is returned as-is and fails literal parsing.
fn strip_trailing_comment(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') {
        // Scan for the closing quote, honoring escapes.
        let mut escaped = false;
        for (offset, ch) in trimmed.char_indices().skip(1) {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                let rest = trimmed[offset + 1..].trim_start();
                if rest.is_empty() || rest.starts_with('#') {
                    return trimmed[..=offset].to_string();
                }
                return trimmed.to_string();
            }
        }
        return trimmed.to_string();
    }
    match trimmed.find('#') {
        Some(offset) => trimmed[..offset].trim().to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_context_resolves_bare_keys() {
        let layer = parse_layer("target_chromatic = 88\n\n[thermo]\nsteps_per_temp = 20000\n");
        assert_eq!(layer.assignments.len(), 2);
        assert_eq!(layer.assignments[0].path.to_string(), "target_chromatic");
        assert_eq!(
            layer.assignments[1].path.to_string(),
            "thermo.steps_per_temp"
        );
        assert_eq!(layer.assignments[1].value, ScalarValue::Integer(20000));
        assert!(layer.skipped_lines.is_empty());
    }

    #[test]
    fn dotted_keys_resolve_absolutely() {
        let layer = parse_layer("[thermo]\nadp.epsilon_decay = 0.999\n");
        assert_eq!(layer.assignments[0].path.to_string(), "adp.epsilon_decay");
    }

    #[test]
    fn comments_and_malformed_lines_are_skipped() {
        let text = "# managed overrides\ntarget_chromatic = 88\nnot a line\nbroken =\n[bad header\n";
        let layer = parse_layer(text);
        assert_eq!(layer.assignments.len(), 1);
        assert_eq!(layer.skipped_lines, vec![3, 4, 5]);
    }

    #[test]
    fn trailing_comments_are_stripped() {
        let layer = parse_layer("steps = 5000 # per temperature\nmetric = \"hop\" # fast\n");
        assert_eq!(layer.assignments[0].value, ScalarValue::Integer(5000));
        assert_eq!(
            layer.assignments[1].value,
            ScalarValue::String("hop".to_string())
        );
    }

    #[test]
    fn garbage_after_closing_quote_skips_the_line() {
        let layer = parse_layer("metric = \"hop\" junk\nlabel = \"ok\"   # fine\n");
        assert_eq!(layer.assignments.len(), 1);
        assert_eq!(
            layer.assignments[0].value,
            ScalarValue::String("ok".to_string())
        );
        assert_eq!(layer.skipped_lines, vec![1]);
    }

    #[test]
    fn hash_inside_quoted_string_is_preserved() {
        let layer = parse_layer("label = \"run #4\"\n");
        assert_eq!(
            layer.assignments[0].value,
            ScalarValue::String("run #4".to_string())
        );
    }

    #[test]
    fn file_order_is_preserved() {
        let layer = parse_layer("a = 1\na = 2\n");
        let values: Vec<_> = layer
            .assignments
            .iter()
            .map(|assignment| assignment.value.clone())
            .collect();
        assert_eq!(values, vec![ScalarValue::Integer(1), ScalarValue::Integer(2)]);
    }
}
