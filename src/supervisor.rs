//! Foreground supervision loop.
//!
//! Drains the line queue with a bounded wait, enforces the wall-clock
//! deadline, and owns escalation from graceful to forceful termination. A run
//! moves through `RUNNING → DRAINING → TERMINATED` on every path:
//!
//! - **sentinel**: the reader asks the child to stop and finishes the queue;
//! - **end of stream**: the reader reaches EOF and finishes the queue;
//! - **deadline**: the supervisor terminates the child and reports a timeout;
//! - **idle**: an empty poll finds both the reader and the child gone. This
//!   covers a reader that died without enqueuing its end marker.
//!
//! After the loop the reader is joined (bounded), the child is reaped
//! (bounded, then killed), and lines still buffered in the queue are handed to
//! the sink so none is lost.
//!
//! If the run is dropped before it completes (for example on an interrupt),
//! a guard cancels the reader and kills the child's whole process group.

use std::fmt::{Display, Formatter};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::process::{LaunchedProcess, Terminator};
use crate::stream::{line_queue, spawn_reader, Frame, Polled, ReaderExit, SENTINEL_GRACE};

/// Default bounded wait of one queue poll.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default wait between a graceful request and a forced kill on timeout.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Default bound on joining the reader and reaping the child.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Consumer of the lines the supervisor drains.
pub trait LineSink {
    /// Handle one line, in arrival order.
    fn accept_line(&mut self, line: &str);

    /// Handle a line that exceeded `limit` bytes and was discarded.
    fn accept_oversized(&mut self, limit: usize);

    /// Handle the deadline of `limit` having passed.
    fn accept_timeout(&mut self, limit: Duration);
}

/// Timing knobs of a [`TimeoutSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Bounded wait of one queue poll.
    pub poll_interval: Duration,
    /// Delay between the sentinel and the graceful request.
    pub sentinel_grace: Duration,
    /// Wait between the graceful request and a forced kill on timeout.
    pub terminate_grace: Duration,
    /// Bound on joining the reader and on reaping the child.
    pub shutdown_wait: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            sentinel_grace: SENTINEL_GRACE,
            terminate_grace: TERMINATE_GRACE,
            shutdown_wait: SHUTDOWN_WAIT,
        }
    }
}

/// Lifecycle phase of a supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Lines are being forwarded.
    Running,
    /// The loop stopped; resources are being released.
    Draining,
    /// The child has been reaped.
    Terminated,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Draining => "DRAINING",
            Self::Terminated => "TERMINATED",
        })
    }
}

/// Why the supervision loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The reader enqueued its end marker.
    EndOfStream,
    /// The deadline passed.
    Deadline,
    /// The reader and the child were both gone with nothing queued.
    Idle,
}

/// Summary of one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionOutcome {
    /// Why the loop stopped.
    pub stop: StopReason,
    /// Whether the deadline passed.
    pub timed_out: bool,
    /// How the reader ended, if it was joined in time.
    pub reader_exit: Option<ReaderExit>,
    /// Exit status of the child, if it could be reaped.
    pub exit_status: Option<ExitStatus>,
}

impl SupervisionOutcome {
    /// Exit code of the child, if it exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.and_then(|status| status.code())
    }
}

/// Runs the foreground loop for one child.
#[derive(Debug, Clone, Default)]
pub struct TimeoutSupervisor {
    settings: SupervisorSettings,
}

impl TimeoutSupervisor {
    /// Supervisor with the given timing.
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self { settings }
    }

    /// Timing in effect.
    #[must_use]
    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Supervise `process` until it finishes or `deadline` passes.
    ///
    /// Every line is handed to `sink` exactly once, in order. `None` means no
    /// deadline. The child is reaped before this returns.
    pub async fn supervise<S>(
        &self,
        process: LaunchedProcess,
        deadline: Option<Duration>,
        sink: &mut S,
    ) -> SupervisionOutcome
    where
        S: LineSink + ?Sized,
    {
        let LaunchedProcess {
            mut child,
            output,
            terminator,
        } = process;

        let (sender, mut receiver) = line_queue();
        let cancel = CancellationToken::new();
        let _release = ReleaseGuard {
            terminator: terminator.clone(),
            cancel: cancel.clone(),
        };
        let mut reader = spawn_reader(
            output,
            sender,
            terminator.clone(),
            self.settings.sentinel_grace,
            cancel.clone(),
        );

        let started = Instant::now();
        info!(
            phase = %Phase::Running,
            pid = terminator.pid().unwrap_or(0),
            ?deadline,
            "supervising child"
        );

        let stop = loop {
            let wait = match deadline {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        warn!(
                            ?elapsed,
                            limit_secs = limit.as_secs(),
                            "deadline exceeded, terminating child"
                        );
                        self.escalate(&mut child, &terminator).await;
                        break StopReason::Deadline;
                    }
                    self.settings.poll_interval.min(limit - elapsed)
                }
                None => self.settings.poll_interval,
            };

            match receiver.poll(wait).await {
                Polled::Line(line) => sink.accept_line(&line),
                Polled::Oversized { limit } => sink.accept_oversized(limit),
                Polled::Finished => break StopReason::EndOfStream,
                Polled::Empty => {
                    if reader.is_finished() && has_exited(&mut child, &terminator) {
                        debug!("reader finished and child exited, stopping");
                        break StopReason::Idle;
                    }
                }
            }
        };

        let timed_out = stop == StopReason::Deadline;
        if let (true, Some(limit)) = (timed_out, deadline) {
            sink.accept_timeout(limit);
        }

        info!(
            phase = %Phase::Draining,
            ?stop,
            elapsed = ?started.elapsed(),
            "supervision loop stopped"
        );

        let reader_exit = self.join_reader(&mut reader, &cancel).await;
        let exit_status = self.reap(&mut child, &terminator).await;

        let remaining = receiver.drain();
        if !remaining.is_empty() {
            debug!(lines = remaining.len(), "forwarding lines buffered after stop");
        }
        for frame in &remaining {
            match frame {
                Frame::Line(line) => sink.accept_line(line),
                Frame::Oversized { limit } => sink.accept_oversized(*limit),
            }
        }

        info!(
            phase = %Phase::Terminated,
            ?reader_exit,
            exit_code = ?exit_status.and_then(|s| s.code()),
            "child released"
        );

        SupervisionOutcome {
            stop,
            timed_out,
            reader_exit,
            exit_status,
        }
    }

    /// Graceful request, bounded wait, then forced kill.
    async fn escalate(&self, child: &mut Child, terminator: &Terminator) {
        terminator.request_graceful();
        match tokio::time::timeout(self.settings.terminate_grace, child.wait()).await {
            Ok(Ok(status)) => {
                terminator.mark_exited();
                info!(?status, "child exited after graceful request");
            }
            Ok(Err(err)) => warn!(%err, "error waiting for child process"),
            Err(_) => {
                warn!(
                    grace = ?self.settings.terminate_grace,
                    "child did not exit within grace window, forcing kill"
                );
                force_kill(child, terminator);
            }
        }
    }

    async fn join_reader(
        &self,
        reader: &mut JoinHandle<ReaderExit>,
        cancel: &CancellationToken,
    ) -> Option<ReaderExit> {
        match tokio::time::timeout(self.settings.shutdown_wait, &mut *reader).await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(err)) => {
                warn!(%err, "reader task failed");
                None
            }
            Err(_) => {
                warn!(
                    wait_secs = self.settings.shutdown_wait.as_secs(),
                    "reader did not finish in time, aborting"
                );
                cancel.cancel();
                reader.abort();
                None
            }
        }
    }

    /// Wait for the child with a bound; kill it if it is still alive.
    async fn reap(&self, child: &mut Child, terminator: &Terminator) -> Option<ExitStatus> {
        let status = match tokio::time::timeout(self.settings.shutdown_wait, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                warn!(%err, "error waiting for child process");
                None
            }
            Err(_) => {
                warn!(
                    wait_secs = self.settings.shutdown_wait.as_secs(),
                    "child still running after shutdown wait, forcing kill"
                );
                force_kill(child, terminator);
                match child.wait().await {
                    Ok(status) => Some(status),
                    Err(err) => {
                        warn!(%err, "error reaping killed child");
                        None
                    }
                }
            }
        };
        if status.is_some() {
            terminator.mark_exited();
        }
        status
    }
}

/// Releases the child and the reader when a run is dropped part way.
///
/// On the normal path the child has been reaped by the time this drops, so
/// the kill is a no-op.
struct ReleaseGuard {
    terminator: Terminator,
    cancel: CancellationToken,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.terminator.has_exited() {
            debug!("run abandoned, killing child process group");
            self.terminator.force_kill();
        }
    }
}

fn force_kill(child: &mut Child, terminator: &Terminator) {
    terminator.force_kill();
    if let Err(err) = child.start_kill() {
        debug!(%err, "direct kill skipped");
    }
}

/// Non-blocking exit check. A failed check counts as exited.
fn has_exited(child: &mut Child, terminator: &Terminator) -> bool {
    match child.try_wait() {
        Ok(Some(_)) => {
            terminator.mark_exited();
            true
        }
        Ok(None) => false,
        Err(err) => {
            warn!(%err, "failed to poll child process status");
            true
        }
    }
}
