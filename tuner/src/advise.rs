//! `tuner advise`: read run history, propose a next override layer.
//!
//! Suggestions are written as an ordinary override file so they go through
//! the same lint and merge gates as a hand-written layer. Nothing here
//! touches the base config or launches a run.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, instrument};

use crate::core::advisor::{Strategy, Suggestion};
use crate::io::config::HarnessConfig;
use crate::io::history::load_snapshots;

/// What `advise` produced.
#[derive(Debug)]
pub enum AdviseOutcome {
    /// No snapshots on disk yet, nothing to learn from.
    NoHistory,
    /// History exists but the strategy found no improving signal.
    NoSignal,
    /// A suggested layer was written.
    Written {
        path: PathBuf,
        suggestion: Suggestion,
    },
}

#[instrument(skip_all, fields(strategy = strategy.name()))]
pub fn advise(harness: &HarnessConfig, strategy: &dyn Strategy) -> Result<AdviseOutcome> {
    let history = load_snapshots(&harness.summaries_dir)?;
    if history.is_empty() {
        return Ok(AdviseOutcome::NoHistory);
    }
    info!(runs = history.len(), "loaded run history");

    let suggestion = strategy.advise(&history);
    if suggestion.is_empty() {
        return Ok(AdviseOutcome::NoSignal);
    }

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = harness
        .overrides_dir
        .join(format!("suggested_{stamp}.toml"));
    fs::create_dir_all(&harness.overrides_dir)
        .with_context(|| format!("create directory {}", harness.overrides_dir.display()))?;
    fs::write(&path, render_layer(&suggestion))
        .with_context(|| format!("write suggested layer {}", path.display()))?;

    Ok(AdviseOutcome::Written { path, suggestion })
}

/// Render a suggestion as an override layer, one commented rationale per
/// assignment, section headers emitted on change.
fn render_layer(suggestion: &Suggestion) -> String {
    let mut out = String::from("# suggested by tuner advise\n");
    let mut current_section: Option<&str> = None;
    for change in &suggestion.changes {
        let section = change.path.section.as_str();
        if current_section != Some(section) {
            if !section.is_empty() {
                out.push('\n');
                out.push_str(&format!("[{section}]\n"));
            }
            current_section = Some(section);
        }
        out.push_str(&format!("# {}\n", change.reason));
        out.push_str(&format!("{} = {}\n", change.path.key, change.value));
    }
    out
}
