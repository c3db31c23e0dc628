//! Test-only helpers for building configs, layers, and run history.

use std::collections::BTreeMap;

use crate::core::document::ConfigDoc;
use crate::core::summary::{FinalResult, InterimResult, LogSummary, Provenance, RunRecord};
use crate::core::types::{KeyPath, RunStatus, ScalarValue};

/// A small base config covering every scalar kind.
pub fn sample_base() -> ConfigDoc {
    ConfigDoc::from_toml_str(
        "target_chromatic = 88\n\
         use_pimc = false\n\
         [thermo]\n\
         t_min = 0.0008\n\
         reheat_factor = 1.5\n\
         [memetic]\n\
         pool_size = 20\n\
         crossover = \"gpx\"\n",
    )
    .expect("sample base parses")
}

/// Parse a key path that is known to be well formed.
pub fn key(raw: &str) -> KeyPath {
    raw.parse().expect("well-formed key path")
}

/// A completed run record with the given best color count and active config.
pub fn completed_run(
    timestamp: &str,
    best_colors: u32,
    active: &[(&str, ScalarValue)],
) -> RunRecord {
    let active_config: BTreeMap<String, ScalarValue> = active
        .iter()
        .map(|(path, value)| ((*path).to_string(), value.clone()))
        .collect();
    RunRecord {
        timestamp: timestamp.to_string(),
        log_file: format!("results/logs/wr_{timestamp}.log"),
        provenance: Provenance::from_base_config("wr_sweep_D_aggr_seed_9001.v1.1.toml"),
        status: RunStatus::Completed,
        summary: LogSummary {
            first_interim: Some(InterimResult {
                colors: best_colors + 8,
                time_s: 12.0,
                line_no: 1,
            }),
            best_colors: Some(best_colors),
            best_time_s: Some(900.0),
            interim_count: 4,
            improvements: Vec::new(),
            improve_count: 0,
            last_improve_time_s: None,
            final_result: Some(FinalResult {
                colors: best_colors,
                conflicts: 0,
                time_s: 3600.0,
                line_no: 40,
            }),
            tda: Some(true),
            tda_gpu: Some(false),
        },
        active_config,
    }
}
