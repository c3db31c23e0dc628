//! Stable exit codes for tuner CLI commands.

/// Command succeeded. A solver run that timed out or crashed still exits 0:
/// the harness did its job and recorded the outcome.
pub const OK: i32 = 0;
/// Harness failure: bad config, unreadable files, staging errors.
pub const FAILURE: i32 = 1;
/// Reserved for argument parse errors (clap's default).
pub const USAGE: i32 = 2;
/// A layer touched an ignored key; nothing was merged or launched.
pub const LINT: i32 = 3;
/// The solver binary does not exist at the configured path.
pub const MISSING_BINARY: i32 = 4;
