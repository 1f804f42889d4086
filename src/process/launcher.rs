//! Child process launcher.
//!
//! Starts the child with:
//! - an explicit environment (`env_clear()` followed by the caller's map),
//!   after the resolver has had a chance to augment `PATH`;
//! - stdin closed, so the child can never block waiting for input;
//! - stdout and stderr merged into one framed line stream;
//! - `kill_on_drop(true)`, so an abandoned child is cleaned up;
//! - on Unix, its own process group, so termination reaches grandchildren
//!   that inherited the output pipes.
//!
//! Batch scripts on Windows are run through `%COMSPEC% /d /s /c "…"` with
//! cmd-style quoting rather than through a shell flag.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use futures_util::{stream, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio_util::codec::FramedRead;
use tracing::info;

use super::platform::{env_lookup, is_batch_script, quote_for_cmd, Platform};
use super::resolver::{ExecutableResolver, SearchPathResolver};
use super::terminate::Terminator;
use super::EnvMap;
use crate::stream::codec::{Frame, LineCodec, MAX_LINE_BYTES};
use crate::{AppError, Result};

/// Merged, framed child output.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Everything needed to start one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Logical command name or path.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Directory the child starts in.
    pub working_dir: PathBuf,
    /// Complete child environment.
    pub env: EnvMap,
}

/// A running child and the handles needed to supervise it.
pub struct LaunchedProcess {
    /// Process handle; owned by whoever reaps the child.
    pub child: Child,
    /// Merged stdout + stderr, one item per line.
    pub output: OutputStream,
    /// Shared termination handle.
    pub terminator: Terminator,
}

impl std::fmt::Debug for LaunchedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedProcess")
            .field("child", &self.child)
            .field("terminator", &self.terminator)
            .finish_non_exhaustive()
    }
}

/// Program and argument layout actually handed to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Executable to start.
    pub program: OsString,
    /// Ordinary, individually quoted arguments.
    pub args: Vec<String>,
    /// Pre-quoted tail appended verbatim (Windows batch wrapping only).
    pub raw_tail: Option<String>,
}

/// Lay out the command for `resolved` on `platform`.
#[must_use]
pub fn plan_command(
    platform: Platform,
    resolved: &Path,
    args: &[String],
    env: &EnvMap,
) -> CommandPlan {
    if platform == Platform::Windows && is_batch_script(resolved) {
        let comspec = env_lookup(env, "COMSPEC").unwrap_or("cmd.exe");
        let line = std::iter::once(resolved.to_string_lossy().into_owned())
            .chain(args.iter().cloned())
            .map(|arg| quote_for_cmd(&arg))
            .collect::<Vec<_>>()
            .join(" ");
        return CommandPlan {
            program: OsString::from(comspec),
            args: Vec::new(),
            raw_tail: Some(format!("/d /s /c \"{line}\"")),
        };
    }

    CommandPlan {
        program: resolved.as_os_str().to_owned(),
        args: args.to_vec(),
        raw_tail: None,
    }
}

/// Merge two output pipes into a single framed line stream.
///
/// Lines from each pipe keep their relative order; lines from different
/// pipes interleave in arrival order. The stream ends once both pipes do.
pub fn merge_output<A, B>(stdout: A, stderr: B, max_line_bytes: usize) -> OutputStream
where
    A: AsyncRead + Send + 'static,
    B: AsyncRead + Send + 'static,
{
    let out = FramedRead::new(stdout, LineCodec::with_max_length(max_line_bytes));
    let err = FramedRead::new(stderr, LineCodec::with_max_length(max_line_bytes));
    stream::select(out, err).boxed()
}

/// Starts children using an [`ExecutableResolver`].
#[derive(Debug, Clone)]
pub struct ProcessLauncher<R = SearchPathResolver> {
    resolver: R,
    platform: Platform,
    max_line_bytes: usize,
}

impl<R: ExecutableResolver> ProcessLauncher<R> {
    /// Launcher for the current host using `resolver`.
    #[must_use]
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            platform: Platform::current(),
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    /// Override the per-line size limit of the output stream.
    #[must_use]
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Start the child described by `request`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the executable cannot be started or its
    /// output pipes cannot be captured.
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchedProcess> {
        let mut env = request.env.clone();
        self.resolver.augment_path(&mut env);
        let resolved = self.resolver.resolve(&request.program, &env);
        let plan = plan_command(self.platform, &resolved, &request.args, &env);

        let mut cmd = Command::new(&plan.program);
        cmd.args(&plan.args);
        if let Some(tail) = &plan.raw_tail {
            append_raw(&mut cmd, tail);
        }

        cmd.env_clear()
            .envs(&env)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Launch(format!("failed to start {}: {err}", resolved.display()))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture child stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture child stderr".into()))?;

        let pid = child.id();
        info!(
            pid = pid.unwrap_or(0),
            program = %resolved.display(),
            cwd = %request.working_dir.display(),
            "child process launched"
        );

        Ok(LaunchedProcess {
            child,
            output: merge_output(stdout, stderr, self.max_line_bytes),
            terminator: Terminator::new(pid),
        })
    }
}

#[cfg(windows)]
fn append_raw(cmd: &mut Command, tail: &str) {
    cmd.raw_arg(tail);
}

#[cfg(not(windows))]
fn append_raw(cmd: &mut Command, tail: &str) {
    cmd.arg(tail);
}
