#![forbid(unsafe_code)]

//! Runs an NDJSON-emitting child process under a cooperative timeout and
//! folds its event stream into a single report.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod invocation;
pub mod process;
pub mod session;
pub mod stream;
pub mod supervisor;

pub use bridge::{Bridge, RunOptions};
pub use config::BridgeConfig;
pub use errors::{AppError, Result};
