//! Child process management.
//!
//! - `platform`: host conventions, kept out of the supervisor core.
//! - `resolver`: the [`ExecutableResolver`] seam and its `PATH` + npm
//!   implementation.
//! - `launcher`: spawning with merged output and closed stdin.
//! - `terminate`: graceful and forceful termination by process id.

pub mod launcher;
pub mod platform;
pub mod resolver;
pub mod terminate;

use std::collections::BTreeMap;

/// Child environment, keyed by variable name.
pub type EnvMap = BTreeMap<String, String>;

pub use launcher::{
    merge_output, plan_command, CommandPlan, LaunchRequest, LaunchedProcess, OutputStream,
    ProcessLauncher,
};
pub use platform::Platform;
pub use resolver::{package_manager_dirs, ExecutableResolver, SearchPathResolver};
pub use terminate::Terminator;
