//! One complete run: launch, supervise, classify, aggregate.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, info_span, Instrument};

use crate::config::BridgeConfig;
use crate::invocation::Invocation;
use crate::process::{EnvMap, ExecutableResolver, LaunchRequest, Platform, ProcessLauncher, SearchPathResolver};
use crate::session::{aggregate, ClassifierOptions, EventClassifier, RunReport};
use crate::supervisor::TimeoutSupervisor;
use crate::Result;

/// Per-run choices that are not part of the argument vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Wall-clock limit; `None` for unbounded.
    pub deadline: Option<Duration>,
    /// Keep every decoded event in the report.
    pub full_trace: bool,
}

/// Launches a child and folds its event stream into a [`RunReport`].
#[derive(Debug, Clone)]
pub struct Bridge<R = SearchPathResolver> {
    launcher: ProcessLauncher<R>,
    supervisor: TimeoutSupervisor,
    transient: Regex,
    partial_preview_chars: usize,
    platform: Platform,
}

impl Bridge<SearchPathResolver> {
    /// Bridge using `PATH` and package-manager lookup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the transient pattern does not compile.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Self::with_resolver(SearchPathResolver::new(), config)
    }
}

impl<R: ExecutableResolver> Bridge<R> {
    /// Bridge using a custom resolver.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the transient pattern does not compile.
    pub fn with_resolver(resolver: R, config: &BridgeConfig) -> Result<Self> {
        Ok(Self {
            launcher: ProcessLauncher::new(resolver).with_max_line_bytes(config.max_line_bytes),
            supervisor: TimeoutSupervisor::new(config.supervisor_settings()),
            transient: config.transient_pattern()?,
            partial_preview_chars: config.partial_preview_chars,
            platform: Platform::current(),
        })
    }

    /// Run `invocation` with the current process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the child cannot be started. Faults
    /// after launch are reported inside the [`RunReport`].
    pub async fn run(&self, invocation: &Invocation, options: RunOptions) -> Result<RunReport> {
        let request = invocation.launch_request(process_env(), self.platform);
        self.run_request(&request, options).await
    }

    /// Run an already assembled launch request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the child cannot be started.
    pub async fn run_request(
        &self,
        request: &LaunchRequest,
        options: RunOptions,
    ) -> Result<RunReport> {
        let span = info_span!("run", program = %request.program);
        async {
            let process = self.launcher.launch(request)?;
            let mut classifier = EventClassifier::new(ClassifierOptions {
                full_trace: options.full_trace,
                partial_preview_chars: self.partial_preview_chars,
                transient_pattern: self.transient.clone(),
            });

            let outcome = self
                .supervisor
                .supervise(process, options.deadline, &mut classifier)
                .await;
            debug!(?outcome, "supervision finished");

            Ok(aggregate(classifier.finish()))
        }
        .instrument(span)
        .await
    }
}

/// Snapshot of this process's environment; non-UTF-8 entries are skipped.
#[must_use]
pub fn process_env() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}
