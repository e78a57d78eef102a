//! Timestamped transcript persistence.
//!
//! One file per session. Lines are appended in sequence order, buffered,
//! and flushed at a bounded cadence; close always flushes. A write failure
//! degrades the writer instead of aborting capture: the first error is
//! surfaced as a warning and later appends are dropped.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::capture::{CaptureError, CapturedLine, StreamOrigin};

/// Flush after this many buffered lines
const FLUSH_EVERY_LINES: usize = 32;
/// ...or after this long since the last flush
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

pub struct TranscriptWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    timestamp: bool,
    pending: usize,
    last_flush: Instant,
    degraded: bool,
}

impl TranscriptWriter {
    /// Create the log file, including its parent directories
    pub fn create(path: PathBuf, timestamp: bool) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            timestamp,
            pending: 0,
            last_flush: Instant::now(),
            degraded: false,
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Append one line. Returns a warning message the first time writing
    /// fails; `None` on success or while degraded.
    pub fn append(&mut self, line: &CapturedLine) -> Option<String> {
        if self.degraded {
            return None;
        }
        let result = writeln!(self.writer, "{}", format_line(line, self.timestamp))
            .and_then(|_| self.maybe_flush());
        match result {
            Ok(()) => None,
            Err(e) => {
                self.degraded = true;
                Some(format!("log file unwritable, logging disabled: {e}"))
            }
        }
    }

    fn maybe_flush(&mut self) -> io::Result<()> {
        self.pending += 1;
        if self.pending >= FLUSH_EVERY_LINES || self.last_flush.elapsed() >= FLUSH_INTERVAL {
            self.writer.flush()?;
            self.pending = 0;
            self.last_flush = Instant::now();
        }
        Ok(())
    }

    /// Flush buffered lines and close the file. Called on every teardown
    /// path; the buffered writer also flushes on drop if this is skipped.
    pub fn close(mut self) -> Result<PathBuf, CaptureError> {
        if !self.degraded {
            self.writer.flush()?;
            self.writer.get_ref().sync_all()?;
        }
        Ok(self.path)
    }
}

/// Format one line as `[HH:MM:SS.mmm] text`. Stderr lines are marked;
/// stdout origin is elided. Without timestamps only the marker remains.
pub fn format_line(line: &CapturedLine, timestamp: bool) -> String {
    let origin = match line.origin {
        StreamOrigin::Stdout => "",
        StreamOrigin::Stderr => "[stderr] ",
    };
    if timestamp {
        format!("[{}] {}{}", line.at.format("%H:%M:%S%.3f"), origin, line.text)
    } else {
        format!("{}{}", origin, line.text)
    }
}

/// `<log_dir>/<profile>/<program>_<YYYYMMDD>_<HHMMSS>.log`
pub fn log_file_path(log_dir: &Path, profile: &str, program: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    log_dir.join(profile).join(format!("{program}_{stamp}.log"))
}
