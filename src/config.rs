//! Bridge configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::session::event::RECONNECT_PATTERN;
use crate::session::PARTIAL_PREVIEW_CHARS;
use crate::stream::MAX_LINE_BYTES;
use crate::supervisor::SupervisorSettings;
use crate::{AppError, Result};

fn default_command() -> String {
    "codex".to_owned()
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_sentinel_grace_ms() -> u64 {
    300
}

fn default_terminate_grace_ms() -> u64 {
    2000
}

fn default_shutdown_wait_seconds() -> u64 {
    5
}

fn default_partial_preview_chars() -> usize {
    PARTIAL_PREVIEW_CHARS
}

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_transient_error_pattern() -> String {
    RECONNECT_PATTERN.to_owned()
}

/// Configuration parsed from a TOML file. Every field is optional.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BridgeConfig {
    /// Logical name or path of the child executable.
    #[serde(default = "default_command")]
    pub command: String,
    /// Wall-clock limit for one run; 0 means unbounded.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Bounded wait of one queue poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between the turn-completion sentinel and the graceful request.
    #[serde(default = "default_sentinel_grace_ms")]
    pub sentinel_grace_ms: u64,
    /// Wait between the graceful request and a forced kill on timeout.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// Bound on joining the reader and reaping the child.
    #[serde(default = "default_shutdown_wait_seconds")]
    pub shutdown_wait_seconds: u64,
    /// Characters of partial output quoted in a timeout diagnostic.
    #[serde(default = "default_partial_preview_chars")]
    pub partial_preview_chars: usize,
    /// Longest output line accepted from the child.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Regex matching error messages that only announce a reconnect.
    #[serde(default = "default_transient_error_pattern")]
    pub transient_error_pattern: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_seconds: default_timeout_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            sentinel_grace_ms: default_sentinel_grace_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            shutdown_wait_seconds: default_shutdown_wait_seconds(),
            partial_preview_chars: default_partial_preview_chars(),
            max_line_bytes: default_max_line_bytes(),
            transient_error_pattern: default_transient_error_pattern(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Deadline for one run, `None` when unbounded.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }

    /// Timing for the supervisor.
    #[must_use]
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            sentinel_grace: Duration::from_millis(self.sentinel_grace_ms),
            terminate_grace: Duration::from_millis(self.terminate_grace_ms),
            shutdown_wait: Duration::from_secs(self.shutdown_wait_seconds),
        }
    }

    /// Compiled transient-notice pattern.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern does not compile.
    pub fn transient_pattern(&self) -> Result<Regex> {
        Ok(Regex::new(&self.transient_error_pattern)?)
    }

    /// Check the loaded values for consistency.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(AppError::Config("command must not be empty".into()));
        }

        if self.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.shutdown_wait_seconds == 0 {
            return Err(AppError::Config(
                "shutdown_wait_seconds must be greater than zero".into(),
            ));
        }

        if self.max_line_bytes == 0 {
            return Err(AppError::Config(
                "max_line_bytes must be greater than zero".into(),
            ));
        }

        self.transient_pattern()?;
        Ok(())
    }
}
