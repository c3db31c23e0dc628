//! Run-history persistence: cumulative CSV table and per-run JSON snapshots.
//!
//! History is append-only. Every summarization appends exactly one CSV row
//! (written with a single `O_APPEND` write so concurrent summarizers cannot
//! interleave) and writes one detailed snapshot. Rows are never mutated or
//! removed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::summary::RunRecord;

/// Column order of the cumulative history table.
pub const CSV_FIELDS: &[&str] = &[
    "timestamp",
    "seed",
    "profile",
    "base_config",
    "log_file",
    "status",
    "first_colors",
    "first_time_s",
    "best_colors",
    "best_time_s",
    "improve_events",
    "last_improve_time_s",
    "tda",
    "tda_gpu",
    "interim_count",
    "final_colors",
    "final_conflicts",
    "final_time_s",
];

/// Append one row for `record`, creating the file (and header) if needed.
pub fn append_csv_row(path: &Path, record: &RunRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create history dir {}", parent.display()))?;
    }
    let row = csv_row(record).join(",") + "\n";

    // Exactly one writer creates the file, so exactly one header lands even
    // when two first-ever summarizers race. The loser falls through to a
    // plain append.
    if !path.exists() {
        let created = OpenOptions::new().append(true).create_new(true).open(path);
        match created {
            Ok(mut file) => {
                let payload = CSV_FIELDS.join(",") + "\n" + &row;
                file.write_all(payload.as_bytes())
                    .with_context(|| format!("write history csv {}", path.display()))?;
                debug!(path = %path.display(), "created history csv");
                return Ok(());
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("create history csv {}", path.display()));
            }
        }
    }

    let header_missing = fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(false);
    let mut payload = String::new();
    if header_missing {
        payload.push_str(&CSV_FIELDS.join(","));
        payload.push('\n');
    }
    payload.push_str(&row);

    // Single append-mode write: concurrent summarizers each land a whole row.
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("open history csv {}", path.display()))?;
    file.write_all(payload.as_bytes())
        .with_context(|| format!("append history csv {}", path.display()))?;
    debug!(path = %path.display(), "appended history row");
    Ok(())
}

fn csv_row(record: &RunRecord) -> Vec<String> {
    let summary = &record.summary;
    let first = summary.first_interim.as_ref();
    let final_result = summary.final_result.as_ref();
    vec![
        escape(&record.timestamp),
        opt(record.provenance.seed),
        escape(record.provenance.profile.as_deref().unwrap_or("")),
        escape(&record.provenance.base_config),
        escape(&record.log_file),
        record.status.to_string(),
        opt(first.map(|entry| entry.colors)),
        opt(first.map(|entry| entry.time_s)),
        opt(summary.best_colors),
        opt(summary.best_time_s),
        summary.improve_count.to_string(),
        opt(summary.last_improve_time_s),
        opt(summary.tda),
        opt(summary.tda_gpu),
        summary.interim_count.to_string(),
        opt(final_result.map(|entry| entry.colors)),
        opt(final_result.map(|entry| entry.conflicts)),
        opt(final_result.map(|entry| entry.time_s)),
    ]
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|inner| inner.to_string()).unwrap_or_default()
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write the detailed per-run snapshot as pretty JSON with trailing newline.
pub fn write_snapshot(path: &Path, record: &RunRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create snapshot dir {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(record).context("serialize run record")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write snapshot {}", path.display()))?;
    debug!(path = %path.display(), "wrote run snapshot");
    Ok(())
}

/// Snapshot path for a run stamp inside the summaries directory.
pub fn snapshot_path(summaries_dir: &Path, stamp: &str) -> PathBuf {
    summaries_dir.join(format!("wr_{stamp}.json"))
}

/// Load every snapshot in `summaries_dir`, ordered oldest-first by timestamp.
///
/// Snapshots that fail to parse are skipped: history accumulated by older
/// harness versions must not wedge the advisor.
pub fn load_snapshots(summaries_dir: &Path) -> Result<Vec<RunRecord>> {
    let mut records = Vec::new();
    let entries = match fs::read_dir(summaries_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(records),
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir {}", summaries_dir.display()))?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %path.display(), err = %err, "skipping unreadable snapshot");
                continue;
            }
        };
        match serde_json::from_str::<RunRecord>(&contents) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(path = %path.display(), err = %err, "skipping unparseable snapshot");
            }
        }
    }
    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::summary::{FinalResult, InterimResult, LogSummary, Provenance};
    use crate::core::types::RunStatus;
    use std::collections::BTreeMap;

    fn record(timestamp: &str) -> RunRecord {
        RunRecord {
            timestamp: timestamp.to_string(),
            log_file: "results/logs/wr_1.log".to_string(),
            provenance: Provenance::from_base_config(
                "configs/base/wr_sweep_D_aggr_seed_9001.v1.1.toml",
            ),
            status: RunStatus::Completed,
            summary: LogSummary {
                first_interim: Some(InterimResult {
                    colors: 92,
                    time_s: 10.0,
                    line_no: 2,
                }),
                best_colors: Some(84),
                best_time_s: Some(3600.0),
                interim_count: 1,
                improvements: Vec::new(),
                improve_count: 2,
                last_improve_time_s: Some(900.0),
                final_result: Some(FinalResult {
                    colors: 84,
                    conflicts: 0,
                    time_s: 3600.0,
                    line_no: 5,
                }),
                tda: Some(true),
                tda_gpu: None,
            },
            active_config: BTreeMap::new(),
        }
    }

    #[test]
    fn header_is_written_once_and_rows_accumulate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("history.csv");

        append_csv_row(&path, &record("2026-08-29T10:00:00Z")).expect("first");
        append_csv_row(&path, &record("2026-08-29T11:00:00Z")).expect("second");

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,seed,profile,"));
        assert!(lines[1].starts_with("2026-08-29T10:00:00Z,9001,aggr,"));
        assert!(lines[1].contains(",completed,92,10,84,"));
        assert!(lines[1].ends_with(",true,,1,84,0,3600"));
    }

    #[test]
    fn racing_first_appends_write_exactly_one_header() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("history.csv");

        std::thread::scope(|scope| {
            for hour in 0..4 {
                let path = &path;
                scope.spawn(move || {
                    append_csv_row(path, &record(&format!("2026-08-29T1{hour}:00:00Z")))
                        .expect("append");
                });
            }
        });

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        let headers = lines
            .iter()
            .filter(|line| line.starts_with("timestamp,seed,"))
            .count();
        assert_eq!(headers, 1);
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = snapshot_path(temp.path(), "20260829_100000_42");
        let record = record("2026-08-29T10:00:00Z");

        write_snapshot(&path, &record).expect("write");
        let loaded: RunRecord =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(loaded, record);
    }

    #[test]
    fn snapshots_load_sorted_and_skip_garbage() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_snapshot(&snapshot_path(temp.path(), "b"), &record("2026-08-29T11:00:00Z"))
            .expect("write");
        write_snapshot(&snapshot_path(temp.path(), "a"), &record("2026-08-29T10:00:00Z"))
            .expect("write");
        fs::write(temp.path().join("wr_junk.json"), "not json").expect("junk");
        fs::write(temp.path().join("history.csv"), "timestamp\n").expect("csv");

        let records = load_snapshots(temp.path()).expect("load");
        assert_eq!(records.len(), 2);
        assert!(records[0].timestamp < records[1].timestamp);
    }

    #[test]
    fn missing_summaries_dir_means_empty_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let records = load_snapshots(&temp.path().join("never-created")).expect("load");
        assert!(records.is_empty());
    }
}
