//! Harness configuration stored in `tuner.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::lint::{DEFAULT_IGNORED_KEYS, IgnoredKeySet};
use crate::core::merge::Strictness;
use crate::core::types::KeyPath;

/// Harness configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values; a missing file is
/// equivalent to an all-default config. Timeout, threads, binary, and base
/// config can additionally be overridden per invocation via CLI flags or
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path to the solver binary.
    pub solver_binary: PathBuf,

    /// Working directory the solver is launched from. The solver resolves its
    /// own relative paths (instance data, checkpoints) against this.
    pub workdir: PathBuf,

    /// Canonical base configuration defining the tunable universe.
    pub base_config: PathBuf,

    /// Where override layers and advisor suggestions live.
    pub overrides_dir: PathBuf,

    /// Where run logs are written.
    pub logs_dir: PathBuf,

    /// Where per-run JSON snapshots and the history CSV are written.
    pub summaries_dir: PathBuf,

    /// Graph instance to stage before launch, if any.
    pub instance_source: Option<PathBuf>,

    /// Destination for the staged instance, relative to `workdir`.
    pub instance_dest: PathBuf,

    /// Wall-clock budget for one solver run, in seconds.
    pub timeout_secs: u64,

    /// Thread-count hint passed to the solver via `OMP_NUM_THREADS`.
    pub threads: u32,

    /// Byte cap on a single run's log file. Output past the cap is dropped
    /// after a truncation notice.
    pub output_limit_bytes: u64,

    /// Type-gating behavior for override merges.
    pub strictness: Strictness,

    /// Key paths no override layer may touch.
    pub ignored_keys: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            solver_binary: PathBuf::from("bin/world_record_dsjc1000"),
            workdir: PathBuf::from("."),
            base_config: PathBuf::from("configs/base/wr_sweep_D_aggr_seed_9001.v1.1.toml"),
            overrides_dir: PathBuf::from("overrides"),
            logs_dir: PathBuf::from("results/logs"),
            summaries_dir: PathBuf::from("results/summaries"),
            instance_source: Some(PathBuf::from("data/DSJC1000.5.col")),
            instance_dest: PathBuf::from("instances/DSJC1000.5.col"),
            timeout_secs: 90 * 60,
            threads: 24,
            output_limit_bytes: 256 * 1024 * 1024,
            strictness: Strictness::Permissive,
            ignored_keys: DEFAULT_IGNORED_KEYS
                .iter()
                .map(|key| key.to_string())
                .collect(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.threads == 0 {
            return Err(anyhow!("threads must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.instance_dest.is_absolute() {
            return Err(anyhow!("instance_dest must be relative to workdir"));
        }
        for key in &self.ignored_keys {
            key.parse::<KeyPath>()
                .with_context(|| format!("ignored_keys entry '{key}'"))?;
        }
        Ok(())
    }

    pub fn ignored_key_set(&self) -> Result<IgnoredKeySet> {
        IgnoredKeySet::from_paths(&self.ignored_keys)
    }

    /// History CSV path derived from the summaries directory.
    pub fn history_csv(&self) -> PathBuf {
        self.summaries_dir.join("history.csv")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
