//! Orchestration for `tuner run`: lint -> merge -> stage -> launch -> summarize.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::core::document::ConfigDoc;
use crate::core::layer::{ConfigLayer, parse_layer};
use crate::core::lint::{Violation, lint};
use crate::core::merge::merge;
use crate::core::summary::RunRecord;
use crate::core::types::RunStatus;
use crate::io::config::HarnessConfig;
use crate::io::history::snapshot_path;
use crate::io::process::run_with_timeout_tee;
use crate::io::stage::{check_binary, stage_instance};
use crate::summarize::{SummarizeRequest, summarize};

/// Environment channel for the solver's thread-count hint.
pub const THREADS_ENV: &str = "OMP_NUM_THREADS";

/// Parameters for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Harness config with any per-invocation overrides already applied.
    pub harness: HarnessConfig,
    /// Override layers, applied in order (later layers win).
    pub layers: Vec<PathBuf>,
    /// Where to write the merged ActiveConfig; defaults to a unique
    /// per-invocation path next to the run log.
    pub active_out: Option<PathBuf>,
}

/// A lint violation tagged with the layer file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerViolation {
    pub layer: PathBuf,
    pub violation: Violation,
}

/// Outcome of one pipeline invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// Some layer touched an ignored key; nothing was merged or launched.
    LintRejected(Vec<LayerViolation>),
    /// The solver was launched and the run was summarized.
    Finished(Box<RunReport>),
}

/// Everything the CLI reports about a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub active_path: PathBuf,
    pub log_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub record: RunRecord,
}

/// Execute the full merge -> run -> summarize pipeline.
///
/// Solver misbehavior (timeout, nonzero exit, crash) is captured as run
/// status, never escalated: only precondition and staging failures error out.
#[instrument(skip_all, fields(layers = request.layers.len()))]
pub fn run_pipeline(request: &RunRequest) -> Result<RunOutcome> {
    let harness = &request.harness;
    harness.validate()?;

    let base = load_base(&harness.base_config)?;
    let layers = load_layers(&request.layers)?;

    // Lint before any merge or launch so a violating run spends nothing.
    let ignored = harness.ignored_key_set()?;
    let mut violations = Vec::new();
    for (path, layer) in &layers {
        for violation in lint(layer, &ignored) {
            violations.push(LayerViolation {
                layer: path.clone(),
                violation,
            });
        }
    }
    if !violations.is_empty() {
        return Ok(RunOutcome::LintRejected(violations));
    }

    let layer_docs: Vec<ConfigLayer> = layers.into_iter().map(|(_, layer)| layer).collect();
    let (active, report) = merge(&base, &layer_docs, harness.strictness);
    for warning in &report.warnings {
        warn!("merge: {warning}");
    }
    info!(applied = report.applied, "merged active config");

    // Preconditions before anything is written or staged.
    check_binary(&harness.solver_binary)?;
    stage_instance(
        harness.instance_source.as_deref(),
        &harness.instance_dest,
        &harness.workdir,
    )?;

    let stamp = run_stamp();
    let active_path = request
        .active_out
        .clone()
        .unwrap_or_else(|| harness.logs_dir.join(format!("wr_{stamp}.active.toml")));
    write_active_config(&active_path, &active)?;
    let active_abs = fs::canonicalize(&active_path)
        .with_context(|| format!("resolve {}", active_path.display()))?;
    let binary_abs = fs::canonicalize(&harness.solver_binary)
        .with_context(|| format!("resolve {}", harness.solver_binary.display()))?;

    let log_path = harness.logs_dir.join(format!("wr_{stamp}.log"));
    let mut cmd = Command::new(binary_abs);
    cmd.arg(&active_abs)
        .current_dir(&harness.workdir)
        .env(THREADS_ENV, harness.threads.to_string());

    info!(log = %log_path.display(), timeout_secs = harness.timeout_secs, "launching solver");
    let output = run_with_timeout_tee(
        cmd,
        Duration::from_secs(harness.timeout_secs),
        &log_path,
        harness.output_limit_bytes,
    )?;
    if output.log_truncated {
        warn!(limit_bytes = harness.output_limit_bytes, "run log truncated at output_limit_bytes");
    }

    let snapshot = snapshot_path(&harness.summaries_dir, &stamp);
    let history = harness.history_csv();
    let record = summarize(&SummarizeRequest {
        log_path: &log_path,
        base_config: Some(harness.base_config.as_path()),
        csv_append: Some(history.as_path()),
        json_out: Some(snapshot.as_path()),
        disposition: output.disposition(),
        active_config: active.flatten(),
    })?;

    Ok(RunOutcome::Finished(Box::new(RunReport {
        active_path,
        log_path,
        snapshot_path: snapshot,
        status: record.status,
        exit_code: output.status.code(),
        timed_out: output.timed_out,
        record,
    })))
}

/// A missing base config is fatal: without it there is no KeyPath universe.
fn load_base(path: &Path) -> Result<ConfigDoc> {
    if !path.is_file() {
        bail!("missing base config {}", path.display());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    ConfigDoc::from_toml_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Missing layer files are warned and skipped; the merge continues.
fn load_layers(paths: &[PathBuf]) -> Result<Vec<(PathBuf, ConfigLayer)>> {
    let mut layers = Vec::new();
    for path in paths {
        if !path.is_file() {
            warn!(layer = %path.display(), "missing layer file, skipped");
            continue;
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        layers.push((path.clone(), parse_layer(&contents)));
    }
    Ok(layers)
}

/// Write the ActiveConfig via a unique temp path and atomic rename, so a
/// concurrent reader never observes a partially written file.
fn write_active_config(path: &Path, active: &ConfigDoc) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("active config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp_path, active.render())
        .with_context(|| format!("write temp active config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace active config {}", path.display()))?;
    Ok(())
}

fn run_stamp() -> String {
    format!(
        "{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        std::process::id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_config_write_is_atomic_and_reparses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("active/wr_test.active.toml");
        let doc = ConfigDoc::from_toml_str("target_chromatic = 88\n[thermo]\nt_min = 0.001\n")
            .expect("doc");

        write_active_config(&path, &doc).expect("write");
        let reread = ConfigDoc::from_toml_str(&fs::read_to_string(&path).expect("read"))
            .expect("reparse");
        assert_eq!(reread, doc);
        // No temp file left behind.
        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn missing_base_config_is_fatal_with_expected_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("base.toml");
        let err = load_base(&missing).unwrap_err();
        assert!(err.to_string().contains("missing base config"));
        assert!(err.to_string().contains("base.toml"));
    }

    #[test]
    fn missing_layer_files_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let present = temp.path().join("present.toml");
        fs::write(&present, "target_chromatic = 88\n").expect("write");

        let layers = load_layers(&[temp.path().join("gone.toml"), present]).expect("load");
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].1.assignments.len(), 1);
    }

    #[test]
    fn run_stamps_are_unique_per_process() {
        let stamp = run_stamp();
        assert!(stamp.ends_with(&std::process::id().to_string()));
    }
}
