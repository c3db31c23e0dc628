//! Pure log-to-record summarization.
//!
//! Scans (possibly truncated) solver output for the marker grammar and builds
//! a structured summary. Scanning never fails: unparseable content simply
//! contributes nothing, and status classification degrades to `Unknown` when
//! neither the log nor the process disposition is conclusive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::markers::{Marker, MarkerSet};
use crate::core::types::{RunStatus, ScalarValue};

/// One `INTERIM RESULT` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterimResult {
    pub colors: u32,
    pub time_s: f64,
    pub line_no: usize,
}

/// One `[IMPROVE]` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementEvent {
    pub old_colors: Option<u32>,
    pub new_colors: Option<u32>,
    pub time_s: Option<f64>,
    pub line_no: usize,
    pub text: String,
}

/// The `FINAL RESULT` line, when the run reached one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub colors: u32,
    pub conflicts: u64,
    pub time_s: f64,
    pub line_no: usize,
}

/// Everything extracted from one log scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub first_interim: Option<InterimResult>,
    /// Running best (minimum) colors over interim and improvement events.
    pub best_colors: Option<u32>,
    pub best_time_s: Option<f64>,
    pub interim_count: u32,
    pub improvements: Vec<ImprovementEvent>,
    /// Count of strictly improving events (new < old, both parsed).
    pub improve_count: u32,
    pub last_improve_time_s: Option<f64>,
    pub final_result: Option<FinalResult>,
    pub tda: Option<bool>,
    pub tda_gpu: Option<bool>,
}

/// Scan log text line-by-line. Pure and total: any text yields a summary.
pub fn scan_log(text: &str, markers: &MarkerSet) -> LogSummary {
    let mut summary = LogSummary::default();
    let mut last_time_seen: Option<f64> = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;

        if let Some(time) = markers.time_context(line) {
            last_time_seen = Some(time);
        }

        match markers.match_line(line) {
            Some(Marker::Interim { colors, time_s }) => {
                summary.interim_count += 1;
                let entry = InterimResult {
                    colors,
                    time_s,
                    line_no,
                };
                if summary.first_interim.is_none() {
                    summary.first_interim = Some(entry);
                }
                record_best(&mut summary, colors, Some(time_s));
            }
            Some(Marker::Improve {
                old_colors,
                new_colors,
                time_s,
            }) => {
                let time_s = time_s.or(last_time_seen);
                summary.improvements.push(ImprovementEvent {
                    old_colors,
                    new_colors,
                    time_s,
                    line_no,
                    text: line.trim().to_string(),
                });
                if let (Some(old), Some(new)) = (old_colors, new_colors)
                    && new < old
                {
                    summary.improve_count += 1;
                }
                if let Some(new) = new_colors {
                    record_best(&mut summary, new, time_s);
                }
            }
            Some(Marker::Final {
                colors,
                conflicts,
                time_s,
            }) => {
                summary.final_result = Some(FinalResult {
                    colors,
                    conflicts,
                    time_s,
                    line_no,
                });
                record_best(&mut summary, colors, Some(time_s));
            }
            None => {}
        }

        let (tda, tda_gpu) = markers.tda_flags(line);
        if tda.is_some() {
            summary.tda = tda;
        }
        if tda_gpu.is_some() {
            summary.tda_gpu = tda_gpu;
        }
    }

    summary.last_improve_time_s = summary
        .improvements
        .iter()
        .rev()
        .find_map(|event| event.time_s);
    summary
}

fn record_best(summary: &mut LogSummary, colors: u32, time_s: Option<f64>) {
    if summary.best_colors.is_none_or(|best| colors < best) {
        summary.best_colors = Some(colors);
        summary.best_time_s = time_s;
    }
}

/// What the harness knows about how the solver process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Killed by the wall-clock watchdog.
    TimedOut,
    /// Exited on its own with this code.
    Exited(i32),
    /// Terminated by a signal other than the watchdog's.
    Signaled,
    /// Exit state not available (standalone summarize of an old log).
    Unknown,
}

/// Classify terminal status from the scan plus the process disposition.
///
/// A well-formed final marker always wins; an abrupt end is split into
/// timeout versus crash by the disposition when known.
pub fn classify_status(summary: &LogSummary, disposition: ExitDisposition) -> RunStatus {
    if summary.final_result.is_some() {
        return RunStatus::Completed;
    }
    match disposition {
        ExitDisposition::TimedOut => RunStatus::TimedOut,
        ExitDisposition::Signaled => RunStatus::Crashed,
        ExitDisposition::Exited(code) if code != 0 => RunStatus::Crashed,
        ExitDisposition::Exited(_) | ExitDisposition::Unknown => RunStatus::Unknown,
    }
}

/// Provenance inferred from the base config filename, plus run identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub base_config: String,
    pub seed: Option<u64>,
    pub profile: Option<String>,
}

impl Provenance {
    /// Infer seed and profile the way the history table expects them:
    /// `seed_<N>` in the filename fixes the seed, an `aggr` substring selects
    /// the aggressive profile, anything else is the regular profile.
    pub fn from_base_config(base_config: &str) -> Self {
        if base_config.is_empty() {
            return Self::default();
        }
        let file_name = std::path::Path::new(base_config)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let seed = file_name
            .split("seed_")
            .nth(1)
            .map(|rest| {
                rest.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse().ok());
        let profile = if file_name.contains("aggr") {
            "aggr"
        } else {
            "regular"
        };
        Self {
            base_config: base_config.to_string(),
            seed,
            profile: Some(profile.to_string()),
        }
    }
}

/// Structured record of one solver execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// RFC 3339 timestamp at summarization time.
    pub timestamp: String,
    pub log_file: String,
    pub provenance: Provenance,
    pub status: RunStatus,
    pub summary: LogSummary,
    /// Flattened ActiveConfig that produced the run, when the pipeline knows
    /// it. Standalone summarization of a bare log leaves this empty.
    #[serde(default)]
    pub active_config: BTreeMap<String, ScalarValue>,
}
