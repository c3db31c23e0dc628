//! Tuning harness for a long-running graph-coloring solver.
//!
//! The harness composes a base TOML config with override layers, launches the
//! solver binary under a timeout, mines its log for progress markers, and
//! records every run in an append-only history. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (config documents, layer parsing,
//!   merge, lint, log mining, history-driven advice). No I/O, fully testable
//!   in isolation.
//! - **[`io`]**: Side-effecting operations (harness config, process
//!   supervision, staging, history files, log tailing).
//!
//! Orchestration modules ([`run`], [`summarize`], [`knob`], [`advise`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod advise;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod knob;
pub mod logging;
pub mod run;
pub mod summarize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
