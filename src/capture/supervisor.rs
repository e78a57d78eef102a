//! Child process supervision: spawning, stream merging, interruption.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::stream::{RawLine, read_lines};
use super::{CaptureError, CaptureEvent, CapturedLine, StreamOrigin, strip_ansi};
use crate::config::DEFAULT_CHANNEL_BUFFER;
use crate::keywords::KeywordSet;

/// How long a child gets after a graceful termination request before it is
/// force-killed.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// How long to keep draining the output streams after the child has exited.
/// Bounds the case where a grandchild inherits the pipes and never closes
/// them.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle of one supervised run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Launching,
    Running,
    Draining,
    Interrupted,
    Terminated,
}

/// Owns the child process and the tasks reading its output.
///
/// Lines from both streams arrive on a single event channel, already
/// sequenced and classified. The channel closes after the final
/// [`CaptureEvent::Exited`].
pub struct Supervisor {
    events: mpsc::Receiver<CaptureEvent>,
    interrupt_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<SupervisorState>,
}

impl Supervisor {
    /// Spawn `command args...` with both output streams piped and begin
    /// capturing. A spawn failure is fatal and leaves no session artifacts.
    pub fn spawn(
        command: &str,
        args: &[String],
        keywords: Arc<KeywordSet>,
    ) -> Result<Self, CaptureError> {
        let (state_tx, state_rx) = watch::channel(SupervisorState::Idle);
        let _ = state_tx.send(SupervisorState::Launching);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let (out_tx, out_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        match child.stdout.take() {
            Some(stdout) => {
                tokio::spawn(read_lines(stdout, StreamOrigin::Stdout, out_tx));
            }
            None => drop(out_tx),
        }

        let (err_tx, err_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        match child.stderr.take() {
            Some(stderr) => {
                tokio::spawn(read_lines(stderr, StreamOrigin::Stderr, err_tx));
            }
            None => drop(err_tx),
        }

        let (event_tx, events) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let (interrupt_tx, interrupt_rx) = mpsc::channel(1);

        tokio::spawn(drive(
            child,
            out_rx,
            err_rx,
            event_tx,
            interrupt_rx,
            keywords,
            state_tx,
        ));

        Ok(Self {
            events,
            interrupt_tx,
            state_rx,
        })
    }

    /// Next capture event; `None` once the run has terminated and all
    /// buffered events were consumed.
    pub async fn next_event(&mut self) -> Option<CaptureEvent> {
        self.events.recv().await
    }

    /// Request cancellation of the run. The child gets a graceful
    /// termination signal, then a forced kill after [`KILL_GRACE`].
    /// Safe to call more than once.
    pub fn interrupt(&self) {
        let _ = self.interrupt_tx.try_send(());
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SupervisorState {
        *self.state_rx.borrow()
    }
}

/// Merge point for both streams: every captured line gets its sequence
/// number here, and stdout is polled first so equal-arrival ties resolve
/// the same way on every run.
async fn drive(
    mut child: Child,
    mut out_rx: mpsc::Receiver<RawLine>,
    mut err_rx: mpsc::Receiver<RawLine>,
    event_tx: mpsc::Sender<CaptureEvent>,
    mut interrupt_rx: mpsc::Receiver<()>,
    keywords: Arc<KeywordSet>,
    state_tx: watch::Sender<SupervisorState>,
) {
    let _ = state_tx.send(SupervisorState::Running);

    let mut sequence: u64 = 0;
    let mut out_open = true;
    let mut err_open = true;
    let mut exit: Option<Option<std::process::ExitStatus>> = None;
    let mut interrupted = false;
    // Unarmed deadlines sit far enough out that they never fire
    let mut drain_deadline = idle_deadline();
    let mut kill_deadline = idle_deadline();

    loop {
        let mut kill_requested = false;
        let mut force_kill = false;

        tokio::select! {
            biased;

            line = out_rx.recv(), if out_open => match line {
                Some(raw) => forward(&event_tx, &keywords, &mut sequence, raw).await,
                None => out_open = false,
            },

            line = err_rx.recv(), if err_open => match line {
                Some(raw) => forward(&event_tx, &keywords, &mut sequence, raw).await,
                None => err_open = false,
            },

            _ = interrupt_rx.recv(), if !interrupted && exit.is_none() => {
                interrupted = true;
                kill_deadline = Instant::now() + KILL_GRACE;
                let _ = state_tx.send(SupervisorState::Interrupted);
                kill_requested = true;
            }

            status = child.wait(), if exit.is_none() => {
                exit = Some(status.ok());
                drain_deadline = Instant::now() + DRAIN_GRACE;
                if !interrupted {
                    let _ = state_tx.send(SupervisorState::Draining);
                }
            }

            _ = tokio::time::sleep_until(kill_deadline), if exit.is_none() => {
                force_kill = true;
                kill_deadline = idle_deadline();
            }

            _ = tokio::time::sleep_until(drain_deadline), if exit.is_some() => break,
        }

        // The select arms may not touch the child while `child.wait()` is
        // borrowed, so signalling happens between iterations.
        if kill_requested {
            request_termination(&mut child);
        }
        if force_kill {
            // start_kill is a no-op once the child has been reaped, so it
            // can never signal a recycled pid
            let _ = child.start_kill();
        }

        if !out_open && !err_open && exit.is_some() {
            break;
        }
    }

    let code = exit.flatten().and_then(|status| status.code());
    let _ = event_tx.send(CaptureEvent::Exited { code, interrupted }).await;
    let _ = state_tx.send(SupervisorState::Terminated);
}

async fn forward(
    event_tx: &mpsc::Sender<CaptureEvent>,
    keywords: &KeywordSet,
    sequence: &mut u64,
    raw: RawLine,
) {
    let text = strip_ansi(&raw.text).into_owned();
    let tags = keywords.classify(&text);
    let line = CapturedLine {
        sequence: *sequence,
        origin: raw.origin,
        text,
        at: raw.at,
        tags,
    };
    *sequence += 1;
    let _ = event_tx.send(CaptureEvent::Line(line)).await;
}

fn idle_deadline() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

/// Ask the child to exit gracefully; the drive loop escalates to a forced
/// kill once [`KILL_GRACE`] elapses without an exit.
#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    // id() is None once the child has been reaped
    let Some(id) = child.id() else { return };
    let _ = kill(Pid::from_raw(id as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::KeywordRule;
    use ratatui::style::Color;

    fn oops_keywords() -> Arc<KeywordSet> {
        Arc::new(KeywordSet::new(vec![KeywordRule::pattern(
            "error",
            "oops",
            false,
            Color::Red,
            true,
        )]))
    }

    fn sh(script: &str, keywords: Arc<KeywordSet>) -> Supervisor {
        Supervisor::spawn("sh", &["-c".to_string(), script.to_string()], keywords)
            .expect("spawn sh")
    }

    async fn collect(sup: &mut Supervisor) -> (Vec<CapturedLine>, Option<i32>, bool) {
        let mut lines = Vec::new();
        let mut code = None;
        let mut interrupted = false;
        while let Some(event) = sup.next_event().await {
            match event {
                CaptureEvent::Line(line) => lines.push(line),
                CaptureEvent::Exited {
                    code: c,
                    interrupted: i,
                } => {
                    code = c;
                    interrupted = i;
                }
            }
        }
        (lines, code, interrupted)
    }

    #[tokio::test]
    async fn test_captures_both_streams_with_total_ordering() {
        let mut sup = sh("echo hello; echo oops 1>&2", oops_keywords());
        let (lines, code, interrupted) = collect(&mut sup).await;

        assert_eq!(code, Some(0));
        assert!(!interrupted);
        assert_eq!(lines.len(), 2);
        assert!(lines.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let hello = lines.iter().find(|l| l.text == "hello").unwrap();
        assert_eq!(hello.origin, StreamOrigin::Stdout);
        assert!(hello.tags.is_empty());

        let oops = lines.iter().find(|l| l.text == "oops").unwrap();
        assert_eq!(oops.origin, StreamOrigin::Stderr);
        assert_eq!(oops.tags, vec!["error".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_child_with_no_output_terminates() {
        let mut sup = sh("exit 1", oops_keywords());
        let (lines, code, interrupted) = collect(&mut sup).await;

        assert!(lines.is_empty());
        assert_eq!(code, Some(1));
        assert!(!interrupted);
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_trailing_chunk_without_newline_is_captured() {
        let mut sup = sh("printf 'no newline'", oops_keywords());
        let (lines, code, _) = collect(&mut sup).await;

        assert_eq!(code, Some(0));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "no newline");
    }

    #[tokio::test]
    async fn test_ansi_codes_are_stripped_before_classification() {
        let mut sup = sh("printf '\\033[31moops\\033[0m\\n'", oops_keywords());
        let (lines, _, _) = collect(&mut sup).await;

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "oops");
        assert_eq!(lines[0].tags, vec!["error".to_string()]);
    }

    #[tokio::test]
    async fn test_interrupt_flushes_output_captured_before_the_kill() {
        let mut sup = sh("echo first; sleep 30; echo last", oops_keywords());

        // Wait for the first line before interrupting
        let first = loop {
            match sup.next_event().await {
                Some(CaptureEvent::Line(line)) => break line,
                Some(_) | None => panic!("child exited before producing output"),
            }
        };
        assert_eq!(first.text, "first");

        sup.interrupt();
        sup.interrupt(); // idempotent

        let (rest, _code, interrupted) = collect(&mut sup).await;
        assert!(interrupted);
        assert!(rest.iter().all(|l| l.text != "last"));
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_child_ignoring_sigterm_is_force_killed_after_grace() {
        let mut sup = sh("trap '' TERM; echo ready; sleep 60", oops_keywords());

        let ready = loop {
            match sup.next_event().await {
                Some(CaptureEvent::Line(line)) => break line,
                Some(_) | None => panic!("child exited before producing output"),
            }
        };
        assert_eq!(ready.text, "ready");

        sup.interrupt();
        let (_, code, interrupted) = collect(&mut sup).await;

        // Killed by signal after the grace period, so no exit code
        assert!(interrupted);
        assert_eq!(code, None);
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let result = Supervisor::spawn("runlog-no-such-command", &[], oops_keywords());
        assert!(matches!(result, Err(CaptureError::Spawn { .. })));
    }
}
