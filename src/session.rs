//! One end-to-end supervised run.
//!
//! A session binds the child's event stream to one transcript file, one
//! history buffer, and one stats tracker, and owns the viewport over that
//! history. Every captured line flows through exactly one ingestion step,
//! so the transcript, history, and stats never disagree between steps.

use std::path::PathBuf;

use crate::capture::{CaptureEvent, CapturedLine};
use crate::config::SessionConfig;
use crate::history::HistoryBuffer;
use crate::stats::{RunStats, RunStatus, StatsTracker};
use crate::transcript::TranscriptWriter;

pub struct Session {
    pub config: SessionConfig,
    pub history: HistoryBuffer,
    stats: StatsTracker,
    transcript: Option<TranscriptWriter>,
    log_path: PathBuf,
    /// Index of the first visible line, 0 = oldest retained
    pub scroll: usize,
    /// Auto-scroll to the newest line while at the live edge
    pub follow_tail: bool,
    viewport_height: usize,
    pub status_message: Option<String>,
    pub show_help: bool,
    pub should_quit: bool,
    pub exit_code: Option<i32>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        transcript: Option<TranscriptWriter>,
        log_path: PathBuf,
    ) -> Self {
        let max_lines = config.max_lines;
        let viewport_height = config.panel_height as usize;
        Self {
            config,
            history: HistoryBuffer::new(max_lines),
            stats: StatsTracker::new(),
            transcript,
            log_path,
            scroll: 0,
            follow_tail: true,
            viewport_height,
            status_message: None,
            show_help: false,
            should_quit: false,
            exit_code: None,
        }
    }

    pub fn handle_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Line(line) => self.ingest(line),
            CaptureEvent::Exited { code, interrupted } => self.finish(code, interrupted),
        }
    }

    /// The single ingestion step: transcript, stats, then history, in
    /// arrival order.
    pub fn ingest(&mut self, line: CapturedLine) {
        if let Some(writer) = self.transcript.as_mut()
            && let Some(warning) = writer.append(&line)
        {
            self.status_message = Some(warning);
        }
        self.stats.record(&line);
        self.history.push(line);
        if self.follow_tail {
            self.scroll = self.max_scroll();
        } else {
            // Eviction can shrink the addressable range
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }

    /// Record the terminal status, close the transcript, and capture the
    /// exit code. Interruption always wins over the exit status the kill
    /// produced.
    fn finish(&mut self, code: Option<i32>, interrupted: bool) {
        if self.finished() {
            return;
        }
        let status = if interrupted {
            RunStatus::Interrupted
        } else if code == Some(0) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        let _ = self.stats.mark_status(status);

        self.exit_code = Some(match (interrupted, code) {
            (true, _) => 130,
            (false, Some(c)) => c,
            (false, None) => 1,
        });

        if let Some(writer) = self.transcript.take() {
            match writer.close() {
                Ok(path) => {
                    self.status_message = Some(format!("Log saved to {}", path.display()));
                }
                Err(e) => {
                    self.status_message = Some(format!("failed to close log: {e}"));
                }
            }
        }
    }

    /// The event channel closed without an exit event; treat as a failed
    /// run so teardown still happens.
    pub fn stream_closed(&mut self) {
        self.finish(None, false);
    }

    /// Terminal once a status transition out of `Running` was recorded
    pub fn finished(&self) -> bool {
        self.stats.status().is_terminal()
    }

    pub fn stats(&self) -> RunStats {
        self.stats.snapshot()
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn logging_active(&self) -> bool {
        self.transcript.as_ref().is_some_and(|w| !w.is_degraded())
    }

    // Viewport ------------------------------------------------------------

    pub fn viewport_height(&self) -> usize {
        self.viewport_height
    }

    /// Called by the renderer with the actual drawable height
    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height.max(1);
        if self.follow_tail {
            self.scroll = self.max_scroll();
        } else {
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }

    fn max_scroll(&self) -> usize {
        self.history.len().saturating_sub(self.viewport_height)
    }

    pub fn visible(&self) -> Vec<&CapturedLine> {
        self.history.window(self.scroll, self.viewport_height)
    }

    pub fn scroll_up(&mut self) {
        if self.scroll > 0 {
            self.scroll -= 1;
            self.follow_tail = false;
        }
    }

    pub fn scroll_down(&mut self) {
        if self.scroll < self.max_scroll() {
            self.scroll += 1;
        }
        if self.scroll == self.max_scroll() {
            self.follow_tail = true;
        }
    }

    pub fn scroll_page_up(&mut self, page_size: usize) {
        self.scroll = self.scroll.saturating_sub(page_size.max(1));
        self.follow_tail = false;
    }

    pub fn scroll_page_down(&mut self, page_size: usize) {
        self.scroll = (self.scroll + page_size.max(1)).min(self.max_scroll());
        if self.scroll == self.max_scroll() {
            self.follow_tail = true;
        }
    }

    pub fn go_to_top(&mut self) {
        self.scroll = 0;
        self.follow_tail = false;
    }

    pub fn go_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
        self.follow_tail = true;
    }
}
