//! Termination requests addressed by process id.
//!
//! A [`Terminator`] is a cheap, clonable handle shared by the stream reader
//! and the supervisor. It signals the child's process group without needing
//! the `Child` itself, so only the supervisor ever waits on or reaps the
//! child. Every request is idempotent: signalling a process that already
//! exited is logged and ignored. Once the supervisor records that the child
//! was reaped, no clone sends anything, since its pid may have been reused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

/// Handle for graceful and forceful termination of one child.
#[derive(Debug, Clone)]
pub struct Terminator {
    pid: Option<u32>,
    graceful_requested: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

impl Terminator {
    /// Handle for the process (group) led by `pid`.
    #[must_use]
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            graceful_requested: Arc::new(AtomicBool::new(false)),
            exited: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that records requests but signals nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(None)
    }

    /// Process id this handle targets, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether a graceful termination has been requested through any clone.
    #[must_use]
    pub fn graceful_requested(&self) -> bool {
        self.graceful_requested.load(Ordering::SeqCst)
    }

    /// Record that the child has been reaped. Later requests send nothing.
    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    /// Whether the child has been reaped.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Ask the child to shut down (SIGTERM to its process group on Unix).
    pub fn request_graceful(&self) {
        self.graceful_requested.store(true, Ordering::SeqCst);
        self.signal(false);
    }

    /// Kill the child and everything in its process group.
    pub fn force_kill(&self) {
        self.signal(true);
    }

    fn signal(&self, force: bool) {
        let Some(pid) = self.pid else { return };
        if self.has_exited() {
            debug!(pid, force, "child already reaped, not signalling");
            return;
        }
        send(pid, force);
    }
}

#[cfg(unix)]
fn send(pid: u32, force: bool) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range, cannot signal");
        return;
    };
    let signal = if force {
        Signal::SIGKILL
    } else {
        Signal::SIGTERM
    };

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => debug!(pid, %signal, "signalled child process group"),
        Err(Errno::ESRCH) => debug!(pid, %signal, "child process group already gone"),
        Err(err) => warn!(pid, %signal, %err, "failed to signal child process group"),
    }
}

#[cfg(not(unix))]
fn send(pid: u32, force: bool) {
    use std::process::{Command, Stdio};

    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        cmd.arg("/F");
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match cmd.status() {
        Ok(status) if status.success() => debug!(pid, force, "taskkill delivered"),
        Ok(status) => debug!(pid, force, ?status, "taskkill reported failure; child may be gone"),
        Err(err) => warn!(pid, force, %err, "failed to run taskkill"),
    }
}
