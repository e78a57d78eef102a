//! Running statistics for one supervised session.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::capture::{CaptureError, CapturedLine, StreamOrigin};

/// Terminal-or-running status of a session. Monotone: once terminal, no
/// transition back to `Running` or to another terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Interrupted => "Interrupted",
        }
    }
}

/// Immutable snapshot handed to the renderer; never a live reference into
/// the tracker.
#[derive(Clone, Debug)]
pub struct RunStats {
    pub elapsed: Duration,
    pub stdout_lines: u64,
    pub stderr_lines: u64,
    pub keyword_counts: BTreeMap<String, u64>,
    pub status: RunStatus,
}

impl RunStats {
    pub fn total_lines(&self) -> u64 {
        self.stdout_lines + self.stderr_lines
    }
}

pub struct StatsTracker {
    started: Instant,
    ended: Option<Instant>,
    stdout_lines: u64,
    stderr_lines: u64,
    keyword_counts: BTreeMap<String, u64>,
    status: RunStatus,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ended: None,
            stdout_lines: 0,
            stderr_lines: 0,
            keyword_counts: BTreeMap::new(),
            status: RunStatus::Running,
        }
    }

    /// Count one captured line and each of its tags
    pub fn record(&mut self, line: &CapturedLine) {
        match line.origin {
            StreamOrigin::Stdout => self.stdout_lines += 1,
            StreamOrigin::Stderr => self.stderr_lines += 1,
        }
        for tag in &line.tags {
            *self.keyword_counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    /// Set the terminal status. A second terminal transition, or a
    /// transition back to `Running`, is a programming defect and fails
    /// with `InvalidTransition`.
    pub fn mark_status(&mut self, status: RunStatus) -> Result<(), CaptureError> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(CaptureError::InvalidTransition {
                from: self.status.label(),
                to: status.label(),
            });
        }
        self.status = status;
        self.ended = Some(Instant::now());
        Ok(())
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Copy-on-read snapshot; elapsed time freezes once a terminal status
    /// is recorded.
    pub fn snapshot(&self) -> RunStats {
        let end = self.ended.unwrap_or_else(Instant::now);
        RunStats {
            elapsed: end.duration_since(self.started),
            stdout_lines: self.stdout_lines,
            stderr_lines: self.stderr_lines,
            keyword_counts: self.keyword_counts.clone(),
            status: self.status,
        }
    }
}
