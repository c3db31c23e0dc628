//! Marker grammar for solver log lines.
//!
//! The solver emits free-form text; the harness only understands three event
//! categories (interim results, improvement events, final result) plus a few
//! context lines (standalone `time = N s`, TDA capability banners). The same
//! marker set backs both the live tailer and the summarizer.

use regex::Regex;

/// A significant event parsed from one log line.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// `INTERIM RESULT: colors = N time = T s`
    Interim { colors: u32, time_s: f64 },
    /// `[IMPROVE] ... OLD -> NEW` (also the unicode arrow). Time context may
    /// come from the same line or the most recent `time = T s` seen.
    Improve {
        old_colors: Option<u32>,
        new_colors: Option<u32>,
        time_s: Option<f64>,
    },
    /// `FINAL RESULT: colors = N ... conflicts = C ... time = T s`
    Final {
        colors: u32,
        conflicts: u64,
        time_s: f64,
    },
}

/// Compiled marker regexes.
#[derive(Debug)]
pub struct MarkerSet {
    interim: Regex,
    improve: Regex,
    time: Regex,
    final_result: Regex,
    tda: Regex,
    tda_gpu: Regex,
    tda_accel: Regex,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerSet {
    pub fn new() -> Self {
        Self {
            interim: Regex::new(r"(?i)INTERIM RESULT:\s*colors\s*=\s*(\d+)\s*time\s*=\s*([\d.]+)\s*s")
                .expect("valid interim regex"),
            improve: Regex::new(r"\[IMPROVE\].*?(\d+)\s*(?:→|->)\s*(\d+)")
                .expect("valid improve regex"),
            time: Regex::new(r"(?i)time\s*=\s*([\d.]+)\s*s").expect("valid time regex"),
            final_result: Regex::new(
                r"(?i)FINAL RESULT:\s*colors\s*=\s*(\d+).*?conflicts\s*=\s*(\d+).*?time\s*=\s*([\d.]+)\s*s",
            )
            .expect("valid final regex"),
            tda: Regex::new(r"(?i)\bTDA\s*=\s*(true|false)\b").expect("valid tda regex"),
            tda_gpu: Regex::new(r"(?i)\bTDA\s*GPU\s*=\s*(true|false)\b")
                .expect("valid tda gpu regex"),
            tda_accel: Regex::new(r"(?i)GPU-accelerated TDA").expect("valid tda accel regex"),
        }
    }

    /// Match one line against the event categories, most specific first.
    pub fn match_line(&self, line: &str) -> Option<Marker> {
        if let Some(caps) = self.final_result.captures(line) {
            return Some(Marker::Final {
                colors: caps[1].parse().ok()?,
                conflicts: caps[2].parse().ok()?,
                time_s: caps[3].parse().ok()?,
            });
        }
        if let Some(caps) = self.interim.captures(line) {
            return Some(Marker::Interim {
                colors: caps[1].parse().ok()?,
                time_s: caps[2].parse().ok()?,
            });
        }
        if let Some(caps) = self.improve.captures(line) {
            return Some(Marker::Improve {
                old_colors: caps[1].parse().ok(),
                new_colors: caps[2].parse().ok(),
                time_s: self.time_context(line),
            });
        }
        None
    }

    /// Whether a line carries any of the three event categories.
    pub fn is_event(&self, line: &str) -> bool {
        self.match_line(line).is_some()
    }

    /// Extract a `time = T s` context value, if present.
    pub fn time_context(&self, line: &str) -> Option<f64> {
        self.time
            .captures(line)
            .and_then(|caps| caps[1].parse().ok())
    }

    /// Extract TDA capability flags: `(tda, tda_gpu)`. The accelerated-TDA
    /// banner implies both.
    pub fn tda_flags(&self, line: &str) -> (Option<bool>, Option<bool>) {
        if self.tda_accel.is_match(line) {
            return (Some(true), Some(true));
        }
        let tda = self
            .tda
            .captures(line)
            .map(|caps| caps[1].eq_ignore_ascii_case("true"));
        let tda_gpu = self
            .tda_gpu
            .captures(line)
            .map(|caps| caps[1].eq_ignore_ascii_case("true"));
        (tda, tda_gpu)
    }
}
