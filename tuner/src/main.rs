//! CLI for the solver tuning harness.
//!
//! Subcommands follow the run lifecycle: `lint` a layer, `run` the merged
//! config under supervision, `watch` a live log, `summarize` a finished one,
//! `knob` for single-key edits, `advise` for a history-driven next layer.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use tuner::advise::{AdviseOutcome, advise};
use tuner::core::advisor::NudgeStrategy;
use tuner::core::layer::parse_layer;
use tuner::core::lint::lint;
use tuner::core::markers::MarkerSet;
use tuner::core::summary::ExitDisposition;
use tuner::core::types::{KeyPath, ScalarValue};
use tuner::exit_codes;
use tuner::io::config::{HarnessConfig, load_config};
use tuner::io::stage::MissingBinary;
use tuner::io::tail::LogTail;
use tuner::knob::{self, KnobValue};
use tuner::logging;
use tuner::run::{RunOutcome, RunRequest, run_pipeline};
use tuner::summarize::{SummarizeRequest, render_human, summarize};

#[derive(Parser)]
#[command(name = "tuner", version, about = "Tuning harness for a graph-coloring solver")]
struct Cli {
    /// Harness config file.
    #[arg(long, global = true, default_value = "tuner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge override layers onto the base config and launch one run.
    Run {
        /// Override layer files, applied in order (later layers win).
        layers: Vec<PathBuf>,
        /// Base config, overriding the harness config.
        #[arg(long, env = "TUNER_BASE_CONFIG")]
        base: Option<PathBuf>,
        /// Where to write the merged active config.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Wall-clock budget for the solver, in seconds.
        #[arg(long, env = "TUNER_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,
        /// Thread-count hint passed to the solver.
        #[arg(long, env = "TUNER_THREADS")]
        threads: Option<u32>,
        /// Solver binary, overriding the harness config.
        #[arg(long, env = "TUNER_BINARY")]
        binary: Option<PathBuf>,
    },
    /// Check an override layer against the ignored-key list.
    Lint {
        /// Layer file to check.
        layer: PathBuf,
    },
    /// Mine a finished log into a run record.
    Summarize {
        /// Log file to mine.
        log: PathBuf,
        /// Base config the run used, for provenance tagging.
        #[arg(long)]
        base_config: Option<PathBuf>,
        /// Append one row to this history table.
        #[arg(long)]
        csv_append: Option<PathBuf>,
        /// Write the detailed snapshot here.
        #[arg(long)]
        json_out: Option<PathBuf>,
        /// The run was killed at its time budget.
        #[arg(long)]
        timed_out: bool,
        /// Exit code the solver returned, if known.
        #[arg(long, conflicts_with = "timed_out")]
        exit_code: Option<i32>,
    },
    /// Print progress markers from a log as they appear.
    Watch {
        /// Log file to follow.
        log: PathBuf,
        /// Replay the existing content and stop at EOF.
        #[arg(long)]
        no_follow: bool,
        /// Poll interval while waiting for appended content.
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
    /// Read or edit single knobs in the managed overrides file.
    Knob {
        #[command(subcommand)]
        action: KnobAction,
    },
    /// Propose a next override layer from run history.
    Advise {
        /// Cap on proposed changes.
        #[arg(long, default_value_t = 3)]
        max_changes: usize,
    },
}

#[derive(Subcommand)]
enum KnobAction {
    /// Print the effective value of one key (override, else base).
    Get { key: String },
    /// Set one key in the managed overrides file.
    Set { key: String, value: String },
    /// Remove one key from the managed overrides file.
    Reset { key: String },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            let code = if err.downcast_ref::<MissingBinary>().is_some() {
                exit_codes::MISSING_BINARY
            } else {
                exit_codes::FAILURE
            };
            std::process::exit(code);
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let harness = load_config(&cli.config)?;
    match cli.command {
        Command::Run {
            layers,
            base,
            out,
            timeout_secs,
            threads,
            binary,
        } => cmd_run(harness, layers, base, out, timeout_secs, threads, binary),
        Command::Lint { layer } => cmd_lint(&harness, &layer),
        Command::Summarize {
            log,
            base_config,
            csv_append,
            json_out,
            timed_out,
            exit_code,
        } => cmd_summarize(log, base_config, csv_append, json_out, timed_out, exit_code),
        Command::Watch {
            log,
            no_follow,
            poll_ms,
        } => cmd_watch(&log, no_follow, poll_ms),
        Command::Knob { action } => cmd_knob(&harness, action),
        Command::Advise { max_changes } => cmd_advise(&harness, max_changes),
    }
}

fn cmd_run(
    mut harness: HarnessConfig,
    layers: Vec<PathBuf>,
    base: Option<PathBuf>,
    out: Option<PathBuf>,
    timeout_secs: Option<u64>,
    threads: Option<u32>,
    binary: Option<PathBuf>,
) -> Result<i32> {
    if let Some(base) = base {
        harness.base_config = base;
    }
    if let Some(timeout_secs) = timeout_secs {
        harness.timeout_secs = timeout_secs;
    }
    if let Some(threads) = threads {
        harness.threads = threads;
    }
    if let Some(binary) = binary {
        harness.solver_binary = binary;
    }

    let request = RunRequest {
        harness,
        layers,
        active_out: out,
    };
    match run_pipeline(&request)? {
        RunOutcome::LintRejected(violations) => {
            for v in &violations {
                eprintln!(
                    "lint: {}:{}: ignored key '{}' may not be overridden",
                    v.layer.display(),
                    v.violation.line,
                    v.violation.path
                );
            }
            Ok(exit_codes::LINT)
        }
        RunOutcome::Finished(report) => {
            println!("active config: {}", report.active_path.display());
            println!("log: {}", report.log_path.display());
            println!("snapshot: {}", report.snapshot_path.display());
            if report.timed_out {
                println!("solver killed at time budget");
            } else if let Some(code) = report.exit_code {
                println!("solver exit code: {code}");
            } else {
                println!("solver terminated by signal");
            }
            print!("{}", render_human(&report.record));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_lint(harness: &HarnessConfig, layer_path: &PathBuf) -> Result<i32> {
    if !layer_path.is_file() {
        bail!("missing layer file {}", layer_path.display());
    }
    let contents = std::fs::read_to_string(layer_path)
        .with_context(|| format!("read {}", layer_path.display()))?;
    let layer = parse_layer(&contents);
    for &line in &layer.skipped_lines {
        eprintln!("lint: {}:{line}: malformed line skipped", layer_path.display());
    }

    let ignored = harness.ignored_key_set()?;
    let violations = lint(&layer, &ignored);
    if violations.is_empty() {
        println!(
            "{}: ok ({} assignments)",
            layer_path.display(),
            layer.assignments.len()
        );
        return Ok(exit_codes::OK);
    }
    for violation in &violations {
        eprintln!(
            "lint: {}:{}: ignored key '{}' may not be overridden",
            layer_path.display(),
            violation.line,
            violation.path
        );
    }
    Ok(exit_codes::LINT)
}

fn cmd_summarize(
    log: PathBuf,
    base_config: Option<PathBuf>,
    csv_append: Option<PathBuf>,
    json_out: Option<PathBuf>,
    timed_out: bool,
    exit_code: Option<i32>,
) -> Result<i32> {
    let disposition = if timed_out {
        ExitDisposition::TimedOut
    } else {
        match exit_code {
            Some(code) => ExitDisposition::Exited(code),
            None => ExitDisposition::Unknown,
        }
    };
    let record = summarize(&SummarizeRequest {
        base_config: base_config.as_deref(),
        csv_append: csv_append.as_deref(),
        json_out: json_out.as_deref(),
        disposition,
        ..SummarizeRequest::for_log(&log)
    })?;
    print!("{}", render_human(&record));
    Ok(exit_codes::OK)
}

fn cmd_watch(log: &PathBuf, no_follow: bool, poll_ms: u64) -> Result<i32> {
    let markers = MarkerSet::new();
    let tail = LogTail::open(log, !no_follow, Duration::from_millis(poll_ms))?;
    for line in tail {
        let line = line?;
        if markers.is_event(&line) {
            println!("{line}");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_knob(harness: &HarnessConfig, action: KnobAction) -> Result<i32> {
    let base_path = &harness.base_config;
    if !base_path.is_file() {
        bail!("missing base config {}", base_path.display());
    }
    let contents = std::fs::read_to_string(base_path)
        .with_context(|| format!("read {}", base_path.display()))?;
    let base = tuner::core::document::ConfigDoc::from_toml_str(&contents)
        .with_context(|| format!("parse {}", base_path.display()))?;
    let store = knob::managed_path(harness);

    match action {
        KnobAction::Get { key } => {
            let path: KeyPath = key.parse()?;
            match knob::get(&store, &base, &path)? {
                KnobValue::Override(value) => println!("{path} = {value} (override)"),
                KnobValue::Base(value) => println!("{path} = {value} (base)"),
                KnobValue::Unset => println!("{path} is unset"),
            }
        }
        KnobAction::Set { key, value } => {
            let path: KeyPath = key.parse()?;
            let Some(value) = ScalarValue::parse_literal(&value) else {
                bail!("'{value}' is not a boolean, integer, float, or quoted string");
            };
            knob::set(&store, &base, &path, value.clone())?;
            println!("{path} = {value} (override written to {})", store.display());
        }
        KnobAction::Reset { key } => {
            let path: KeyPath = key.parse()?;
            match knob::reset(&store, &path)? {
                Some(removed) => {
                    print!("{path}: removed override {removed}");
                    match base.get(&path) {
                        Some(restored) => println!(", base value {restored} applies"),
                        None => println!(),
                    }
                }
                None => println!("{path}: no override set"),
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_advise(harness: &HarnessConfig, max_changes: usize) -> Result<i32> {
    let strategy = NudgeStrategy { max_changes };
    match advise(harness, &strategy)? {
        AdviseOutcome::NoHistory => {
            println!("no run history under {}", harness.summaries_dir.display());
        }
        AdviseOutcome::NoSignal => {
            println!("history shows no improving trend to continue");
        }
        AdviseOutcome::Written { path, suggestion } => {
            println!("wrote {} ({} changes):", path.display(), suggestion.changes.len());
            for change in &suggestion.changes {
                println!("  {} = {}  # {}", change.path, change.value, change.reason);
            }
        }
    }
    Ok(exit_codes::OK)
}
