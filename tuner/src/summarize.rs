//! Orchestration for `tuner summarize`: log -> RunRecord -> history.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument};

use crate::core::markers::MarkerSet;
use crate::core::summary::{ExitDisposition, Provenance, RunRecord, classify_status, scan_log};
use crate::core::types::ScalarValue;
use crate::io::history::{append_csv_row, write_snapshot};

/// Inputs for one summarization.
#[derive(Debug)]
pub struct SummarizeRequest<'a> {
    pub log_path: &'a Path,
    /// Base config used for the run, for provenance tagging.
    pub base_config: Option<&'a Path>,
    /// Append one row to this cumulative history table.
    pub csv_append: Option<&'a Path>,
    /// Write the detailed snapshot here.
    pub json_out: Option<&'a Path>,
    /// What the harness knows about how the process ended.
    pub disposition: ExitDisposition,
    /// Flattened ActiveConfig for the run, when the pipeline knows it.
    pub active_config: BTreeMap<String, ScalarValue>,
}

impl<'a> SummarizeRequest<'a> {
    /// Bare request for a standalone log with no pipeline context.
    pub fn for_log(log_path: &'a Path) -> Self {
        Self {
            log_path,
            base_config: None,
            csv_append: None,
            json_out: None,
            disposition: ExitDisposition::Unknown,
            active_config: BTreeMap::new(),
        }
    }
}

/// Summarize a log into a [`RunRecord`] and persist it.
///
/// Scanning is best-effort: undecodable bytes are replaced, unparseable
/// content contributes nothing, and a log with no conclusive ending yields
/// status `Unknown` rather than an error. Only a missing/unreadable log file
/// or a failed history write is an error here.
#[instrument(skip_all, fields(log = %request.log_path.display()))]
pub fn summarize(request: &SummarizeRequest<'_>) -> Result<RunRecord> {
    let raw = fs::read(request.log_path)
        .with_context(|| format!("read log {}", request.log_path.display()))?;
    let text = String::from_utf8_lossy(&raw);

    let markers = MarkerSet::new();
    let summary = scan_log(&text, &markers);
    let status = classify_status(&summary, request.disposition);

    let base_config = request
        .base_config
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    let record = RunRecord {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        log_file: request.log_path.display().to_string(),
        provenance: Provenance::from_base_config(&base_config),
        status,
        summary,
        active_config: request.active_config.clone(),
    };

    if let Some(csv_path) = request.csv_append {
        append_csv_row(csv_path, &record)?;
        info!(path = %csv_path.display(), "appended history row");
    }
    if let Some(json_path) = request.json_out {
        write_snapshot(json_path, &record)?;
        info!(path = %json_path.display(), "wrote snapshot");
    }

    Ok(record)
}

/// Human-friendly rendering of a record, printed by the CLI.
pub fn render_human(record: &RunRecord) -> String {
    let summary = &record.summary;
    let mut out = String::new();
    out.push_str("=== WR Log Summary ===\n");
    out.push_str(&format!("log: {}\n", record.log_file));
    if !record.provenance.base_config.is_empty() {
        out.push_str(&format!("base_config: {}\n", record.provenance.base_config));
        out.push_str(&format!(
            "seed: {} | profile: {}\n",
            record
                .provenance
                .seed
                .map(|seed| seed.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            record.provenance.profile.as_deref().unwrap_or("unknown"),
        ));
    }
    out.push_str(&format!("status: {}\n", record.status));
    out.push_str(&format!("interim_count: {}\n", summary.interim_count));
    if let Some(first) = &summary.first_interim {
        out.push_str(&format!(
            "first_interim: colors={} time={}s\n",
            first.colors, first.time_s
        ));
    }
    if let Some(best) = summary.best_colors {
        out.push_str(&format!(
            "best: colors={} time={}\n",
            best,
            summary
                .best_time_s
                .map(|time| format!("{time}s"))
                .unwrap_or_else(|| "unknown".to_string()),
        ));
    }
    out.push_str(&format!("improve_events: {}", summary.improve_count));
    if let Some(last) = summary.last_improve_time_s {
        out.push_str(&format!(" (last at {last}s)"));
    }
    out.push('\n');
    if summary.tda.is_some() || summary.tda_gpu.is_some() {
        out.push_str(&format!(
            "tda: {} | tda_gpu: {}\n",
            flag(summary.tda),
            flag(summary.tda_gpu)
        ));
    }
    if let Some(final_result) = &summary.final_result {
        out.push_str(&format!(
            "final: colors={} conflicts={} time={}s\n",
            final_result.colors, final_result.conflicts, final_result.time_s
        ));
    }
    out
}

fn flag(value: Option<bool>) -> String {
    value.map(|flag| flag.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RunStatus;

    const LOG: &str = "\
INTERIM RESULT: colors = 92 time = 10.0 s
[IMPROVE] 92 -> 90 time = 120.0 s
[IMPROVE] 90 -> 85 time = 900.0 s
FINAL RESULT: colors = 84 conflicts = 0 time = 3600.0 s
";

    #[test]
    fn summarize_writes_row_and_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("wr_1.log");
        let csv_path = temp.path().join("summaries/history.csv");
        let json_path = temp.path().join("summaries/wr_1.json");
        std::fs::write(&log_path, LOG).expect("write log");

        let record = summarize(&SummarizeRequest {
            log_path: &log_path,
            base_config: Some(Path::new("configs/base/wr_sweep_D_aggr_seed_9001.v1.1.toml")),
            csv_append: Some(&csv_path),
            json_out: Some(&json_path),
            disposition: ExitDisposition::Exited(0),
            active_config: BTreeMap::new(),
        })
        .expect("summarize");

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.summary.best_colors, Some(84));
        assert_eq!(record.summary.improve_count, 2);
        assert_eq!(record.provenance.seed, Some(9001));
        assert!(csv_path.is_file());
        assert!(json_path.is_file());
    }

    #[test]
    fn truncated_log_degrades_to_partial_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("wr_cut.log");
        std::fs::write(
            &log_path,
            "INTERIM RESULT: colors = 90 time = 10.0 s\nphase swi",
        )
        .expect("write log");

        let record = summarize(&SummarizeRequest {
            disposition: ExitDisposition::TimedOut,
            ..SummarizeRequest::for_log(&log_path)
        })
        .expect("summarize");

        assert_eq!(record.status, RunStatus::TimedOut);
        assert_eq!(record.summary.best_colors, Some(90));
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("wr_bin.log");
        let mut bytes = b"FINAL RESULT: colors = 84 conflicts = 0 time = 9.0 s\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, 0x00]);
        std::fs::write(&log_path, bytes).expect("write log");

        let record = summarize(&SummarizeRequest {
            disposition: ExitDisposition::Exited(0),
            ..SummarizeRequest::for_log(&log_path)
        })
        .expect("summarize");
        assert_eq!(record.status, RunStatus::Completed);
    }

    #[test]
    fn missing_log_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("gone.log");
        let err = summarize(&SummarizeRequest::for_log(&missing)).unwrap_err();
        assert!(err.to_string().contains("read log"));
    }

    #[test]
    fn human_rendering_names_the_essentials() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("wr_1.log");
        std::fs::write(&log_path, LOG).expect("write log");
        let record = summarize(&SummarizeRequest {
            disposition: ExitDisposition::Exited(0),
            ..SummarizeRequest::for_log(&log_path)
        })
        .expect("summarize");

        let text = render_human(&record);
        assert!(text.contains("best: colors=84"));
        assert!(text.contains("improve_events: 2 (last at 900s)"));
        assert!(text.contains("final: colors=84 conflicts=0 time=3600s"));
    }
}
