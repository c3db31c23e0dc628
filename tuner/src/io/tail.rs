//! Read-only log tailer backing the live monitor.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

pub const DEFAULT_POLL: Duration = Duration::from_millis(500);

/// Lazy line source over a log that may still be written.
///
/// Replays existing content from the start, then polls for appended content.
/// Purely observational: opens the file read-only and never coordinates with
/// the writer. Partial trailing lines (a writer caught mid-line) are held back
/// until their newline arrives, so consumers only ever see whole lines.
/// Bytes that are not valid UTF-8 are replaced rather than treated as errors,
/// matching how summarization reads the same logs.
pub struct LogTail {
    reader: BufReader<File>,
    path: PathBuf,
    follow: bool,
    poll: Duration,
    pending: Vec<u8>,
}

impl LogTail {
    /// Attach to `path`. With `follow`, the iterator is infinite and keeps
    /// polling after EOF; without it, the iterator ends at the current EOF
    /// (replaying a completed log and then producing nothing further).
    pub fn open(path: &Path, follow: bool, poll: Duration) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("open log {}", path.display()))?;
        debug!(path = %path.display(), follow, "attached log tail");
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            follow,
            poll,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for LogTail {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut chunk = Vec::new();
            match self.reader.read_until(b'\n', &mut chunk) {
                Ok(0) => {
                    if !self.follow {
                        if self.pending.is_empty() {
                            return None;
                        }
                        // Truncated final line of a finished log.
                        let line = std::mem::take(&mut self.pending);
                        return Some(Ok(String::from_utf8_lossy(&line).into_owned()));
                    }
                    thread::sleep(self.poll);
                }
                Ok(_) => {
                    self.pending.extend_from_slice(&chunk);
                    if self.pending.ends_with(b"\n") {
                        let mut line = std::mem::take(&mut self.pending);
                        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
                            line.pop();
                        }
                        return Some(Ok(String::from_utf8_lossy(&line).into_owned()));
                    }
                    // Writer is mid-line; keep accumulating.
                }
                Err(err) => {
                    return Some(Err(err).with_context(|| {
                        format!("read log {}", self.path.display())
                    }));
                }
            }
        }
    }
}
