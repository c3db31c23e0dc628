//! Solver process supervision: timeout, process-group kill, log teeing.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::summary::ExitDisposition;

/// Poll interval while waiting for the tee threads to drain.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Where a teed line should be mirrored.
#[derive(Debug, Clone, Copy)]
enum Mirror {
    Stdout,
    Stderr,
}

/// Result of one supervised solver execution.
#[derive(Debug)]
pub struct SolverOutput {
    pub status: ExitStatus,
    pub timed_out: bool,
    /// Bytes written to the log file.
    pub log_bytes: u64,
    /// The log hit the configured byte cap and was truncated.
    pub log_truncated: bool,
}

impl SolverOutput {
    /// Classify how the process ended, for status classification downstream.
    pub fn disposition(&self) -> ExitDisposition {
        if self.timed_out {
            return ExitDisposition::TimedOut;
        }
        match self.status.code() {
            Some(code) => ExitDisposition::Exited(code),
            None => ExitDisposition::Signaled,
        }
    }
}

/// Shared log destination with a hard byte cap.
///
/// Once the cap is reached a single truncation notice is written and further
/// lines are dropped from the file (they are still mirrored to the terminal).
struct LogSink {
    writer: BufWriter<File>,
    written: u64,
    limit: u64,
    truncated: bool,
}

impl LogSink {
    fn new(file: File, limit: u64) -> Self {
        Self {
            writer: BufWriter::new(file),
            written: 0,
            limit,
            truncated: false,
        }
    }

    /// Write one whole line, flushed so a concurrent tailer sees it.
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<u64> {
        if self.truncated {
            return Ok(0);
        }
        if self.written + line.len() as u64 > self.limit {
            self.truncated = true;
            let notice = format!("[log truncated at {} bytes]\n", self.written);
            self.writer.write_all(notice.as_bytes())?;
            self.writer.flush()?;
            return Ok(0);
        }
        self.writer.write_all(line)?;
        self.writer.flush()?;
        self.written += line.len() as u64;
        Ok(line.len() as u64)
    }
}

/// Run a command under a hard wall-clock timeout, teeing interleaved
/// stdout/stderr to `log_path` line-by-line (capped at `limit_bytes`) while
/// mirroring each line to the invoking terminal.
///
/// Output is drained concurrently while the child runs so neither pipe can
/// deadlock. The deadline bounds the drain as well as the child: on expiry
/// the child's entire process group is killed, so solver worker processes do
/// not outlive the run and cannot hold the pipes open past the budget.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), log = %log_path.display()))]
pub fn run_with_timeout_tee(
    mut cmd: Command,
    timeout: Duration,
    log_path: &Path,
    limit_bytes: u64,
) -> Result<SolverOutput> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let log_file = File::create(log_path)
        .with_context(|| format!("create log file {}", log_path.display()))?;
    let log = Arc::new(Mutex::new(LogSink::new(log_file, limit_bytes)));

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    put_in_own_process_group(&mut cmd);

    debug!("spawning solver process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn solver");
            return Err(err).context("spawn solver");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_log = Arc::clone(&log);
    let stderr_log = Arc::clone(&log);
    let stdout_handle =
        thread::spawn(move || tee_stream(stdout, stdout_log, Mirror::Stdout));
    let stderr_handle =
        thread::spawn(move || tee_stream(stderr, stderr_log, Mirror::Stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for solver")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "solver timed out, killing process group");
            timed_out = true;
            kill_process_tree(&mut child);
            child.wait().context("wait solver after kill")?
        }
    };

    // The deadline covers the drain too: a descendant that inherited the
    // pipes must not hold the harness open after the child itself exited.
    let deadline = started + timeout;
    let stdout_bytes =
        drain_tee(stdout_handle, deadline, &mut child, &mut timed_out).context("join stdout")?;
    let stderr_bytes =
        drain_tee(stderr_handle, deadline, &mut child, &mut timed_out).context("join stderr")?;

    let log_truncated = log.lock().map(|sink| sink.truncated).unwrap_or(false);

    debug!(exit_code = ?status.code(), timed_out, "solver finished");
    Ok(SolverOutput {
        status,
        timed_out,
        log_bytes: stdout_bytes + stderr_bytes,
        log_truncated,
    })
}

/// Join one tee thread, enforcing `deadline` on the drain. If the deadline
/// passes with the pipe still open, the process group is killed so the
/// remaining writers die and the read hits EOF.
fn drain_tee(
    handle: thread::JoinHandle<Result<u64>>,
    deadline: Instant,
    child: &mut Child,
    timed_out: &mut bool,
) -> Result<u64> {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(DRAIN_POLL);
    }
    if !handle.is_finished() && !*timed_out {
        warn!("output drain exceeded the time budget, killing process group");
        *timed_out = true;
        kill_process_tree(child);
    }
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("tee thread panicked")),
    }
}

/// Copy a pipe to the shared log sink line-by-line and mirror it to the
/// terminal.
fn tee_stream<R: Read>(reader: R, log: Arc<Mutex<LogSink>>, mirror: Mirror) -> Result<u64> {
    use std::io::BufRead;

    let mut buf_reader = std::io::BufReader::new(reader);
    let mut written = 0u64;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read solver output")?;
        if n == 0 {
            break;
        }

        if let Ok(mut sink) = log.lock() {
            match sink.write_line(&line) {
                Ok(bytes) => written += bytes,
                Err(err) => warn!(err = %err, "failed to write run log"),
            }
        }

        // Mirroring is best-effort; the log file is the artifact of record.
        let _ = match mirror {
            Mirror::Stdout => std::io::stdout().write_all(&line),
            Mirror::Stderr => std::io::stderr().write_all(&line),
        };
    }

    Ok(written)
}

#[cfg(unix)]
fn put_in_own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn put_in_own_process_group(_cmd: &mut Command) {}

/// Kill the child and its descendants.
///
/// The child was spawned as its own process group leader, so signalling the
/// negative pgid reaches every worker it forked.
#[cfg(unix)]
#[allow(unsafe_code)] // kill(2) on the process group has no safe wrapper in std
fn kill_process_tree(child: &mut Child) {
    let pgid = child.id() as i32;
    let killed = unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0;
    if !killed {
        warn!(pgid, "process group kill failed, killing child directly");
        if let Err(err) = child.kill() {
            warn!(err = %err, "failed to kill solver child");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(err = %err, "failed to kill solver child");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LIMIT: u64 = u64::MAX;

    #[cfg(unix)]
    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[cfg(unix)]
    #[test]
    fn captures_interleaved_output_to_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");

        let output = run_with_timeout_tee(
            sh("echo out-line; echo err-line >&2"),
            Duration::from_secs(10),
            &log_path,
            NO_LIMIT,
        )
        .expect("run");

        assert!(output.status.success());
        assert!(!output.timed_out);
        assert!(!output.log_truncated);
        assert_eq!(output.disposition(), ExitDisposition::Exited(0));
        let contents = fs::read_to_string(&log_path).expect("read log");
        assert!(contents.contains("out-line"));
        assert!(contents.contains("err-line"));
        assert_eq!(output.log_bytes, contents.len() as u64);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported_not_errored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");

        let output =
            run_with_timeout_tee(sh("exit 3"), Duration::from_secs(10), &log_path, NO_LIMIT)
                .expect("run");

        assert!(!output.status.success());
        assert_eq!(output.disposition(), ExitDisposition::Exited(3));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_long_running_process() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");

        let start = Instant::now();
        let output = run_with_timeout_tee(
            sh("echo before-timeout; sleep 30"),
            Duration::from_secs(1),
            &log_path,
            NO_LIMIT,
        )
        .expect("run");

        assert!(output.timed_out);
        assert_eq!(output.disposition(), ExitDisposition::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(10));
        let contents = fs::read_to_string(&log_path).expect("read log");
        assert!(contents.contains("before-timeout"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_descendants_too() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");
        let marker = temp.path().join("grandchild-survived");

        // The grandchild would write the marker after the deadline if it
        // survived the group kill.
        let script = format!(
            "(sleep 3 && touch {}) & sleep 30",
            marker.display()
        );
        let output =
            run_with_timeout_tee(sh(&script), Duration::from_secs(1), &log_path, NO_LIMIT)
                .expect("run");

        assert!(output.timed_out);
        thread::sleep(Duration::from_secs(4));
        assert!(!marker.exists(), "descendant outlived the timeout kill");
    }

    #[cfg(unix)]
    #[test]
    fn lingering_descendant_cannot_hold_the_drain_past_the_budget() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");

        // The child exits immediately but the backgrounded grandchild keeps
        // the inherited stdout pipe open well past the budget.
        let start = Instant::now();
        let output = run_with_timeout_tee(
            sh("(sleep 30) & echo 'FINAL RESULT: colors = 90 conflicts = 0 time = 1.0 s'; exit 0"),
            Duration::from_secs(1),
            &log_path,
            NO_LIMIT,
        )
        .expect("run");

        assert!(
            start.elapsed() < Duration::from_secs(10),
            "drain blocked {:?} despite a 1s budget",
            start.elapsed()
        );
        assert!(output.timed_out);
        let contents = fs::read_to_string(&log_path).expect("read log");
        assert!(contents.contains("FINAL RESULT"));
    }

    #[cfg(unix)]
    #[test]
    fn log_is_capped_at_the_byte_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");

        let output = run_with_timeout_tee(
            sh("i=0; while [ $i -lt 200 ]; do echo chatter-line-$i; i=$((i+1)); done"),
            Duration::from_secs(10),
            &log_path,
            128,
        )
        .expect("run");

        assert!(output.log_truncated);
        assert!(output.log_bytes <= 128);
        let contents = fs::read_to_string(&log_path).expect("read log");
        assert!(contents.contains("[log truncated at"));
        assert!(contents.len() < 1024);
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("run.log");
        let cmd = Command::new(temp.path().join("no-such-binary"));

        let err =
            run_with_timeout_tee(cmd, Duration::from_secs(1), &log_path, NO_LIMIT).unwrap_err();
        assert!(err.to_string().contains("spawn solver"));
    }
}
