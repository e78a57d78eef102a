//! Child process capture engine.
//!
//! Spawns one child command, reads its stdout and stderr concurrently,
//! and merges both streams into a single globally-ordered sequence of
//! captured lines.

pub mod stream;
pub mod supervisor;

use std::borrow::Cow;
use std::io;
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use thiserror::Error;

/// Which child stream a line arrived on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

/// One ingested, timestamped, sequenced unit of child output.
///
/// Sequence numbers are strictly increasing across both streams and are
/// assigned at a single merge point inside the supervisor.
#[derive(Clone, Debug)]
pub struct CapturedLine {
    pub sequence: u64,
    pub origin: StreamOrigin,
    /// One logical output line, ANSI codes stripped, no trailing newline
    pub text: String,
    pub at: DateTime<Local>,
    /// Names of the keyword rules that matched this line
    pub tags: Vec<String>,
}

/// Events emitted by the supervisor's event channel
#[derive(Debug)]
pub enum CaptureEvent {
    Line(CapturedLine),
    /// The child exited and both streams are drained. Last event on the
    /// channel. `code` is `None` when the child was killed by a signal.
    Exited { code: Option<i32>, interrupted: bool },
}

/// Errors produced by the capture engine
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("log file error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Remove ANSI escape sequences from captured text
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| {
        Regex::new(r"\x1b(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ansi pattern compiles")
    });
    re.replace_all(text, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31merror\x1b[0m done"), "error done");
    }

    #[test]
    fn test_strip_ansi_passes_plain_text_through() {
        assert_eq!(strip_ansi("plain text"), "plain text");
    }

    #[test]
    fn test_strip_ansi_handles_cursor_sequences() {
        assert_eq!(strip_ansi("\x1b[2K\x1b[1Gprogress 50%"), "progress 50%");
    }
}
