#![forbid(unsafe_code)]

//! `agent-bridge` runs an NDJSON-emitting agent CLI under a timeout and
//! prints one JSON result on stdout.
//!
//! Logs go to stderr. Exit status is 0 on success, 1 when the run failed,
//! and 2 when it could not be started at all.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_bridge::bridge::{Bridge, RunOptions};
use agent_bridge::config::BridgeConfig;
use agent_bridge::invocation::{Invocation, SandboxPolicy};
use agent_bridge::session::RunReport;
use agent_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-bridge", about = "Run an agent CLI and report its answer as JSON", version, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Instruction for the task to send to the agent.
    #[arg(long, alias = "PROMPT")]
    prompt: String,

    /// Workspace root for the agent.
    #[arg(long)]
    cd: PathBuf,

    /// Sandbox policy for commands the agent runs.
    #[arg(long, default_value_t = SandboxPolicy::ReadOnly)]
    sandbox: SandboxPolicy,

    /// Resume this session instead of starting a new one.
    #[arg(long, alias = "SESSION_ID")]
    session_id: Option<String>,

    /// Model override.
    #[arg(long)]
    model: Option<String>,

    /// Configuration profile to load.
    #[arg(long)]
    profile: Option<String>,

    /// Image files to attach; repeat the flag or separate with commas.
    #[arg(long = "image")]
    images: Vec<String>,

    /// Run every command without approvals or sandboxing.
    #[arg(long)]
    yolo: bool,

    /// Refuse to run outside a Git repository.
    #[arg(long)]
    no_skip_git_repo_check: bool,

    /// Accepted for compatibility; skipping the check is the default.
    #[arg(long, hide = true, conflicts_with = "no_skip_git_repo_check")]
    skip_git_repo_check: bool,

    /// Wall-clock limit in seconds; 0 disables it.
    #[arg(long)]
    timeout: Option<u64>,

    /// Include every decoded event in the result.
    #[arg(long, alias = "return-all-messages")]
    return_all_events: bool,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Only log warnings and errors.
    #[arg(long, alias = "no-progress")]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format, args.quiet) {
        print_report(&RunReport::failure(err.to_string()));
        return ExitCode::from(2);
    }

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Io(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(report) => {
            print_report(&report);
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            error!(%err, "run could not be started");
            print_report(&RunReport::failure(err.to_string()));
            ExitCode::from(2)
        }
    }
}

async fn run(args: Cli) -> Result<RunReport> {
    let config = match &args.config {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    info!(command = %config.command, "configuration loaded");

    let timeout = args.timeout.unwrap_or(config.timeout_seconds);
    let options = RunOptions {
        deadline: (timeout > 0).then(|| Duration::from_secs(timeout)),
        full_trace: args.return_all_events,
    };

    let mut invocation = Invocation::new(args.prompt, args.cd);
    invocation.command.clone_from(&config.command);
    invocation.sandbox = args.sandbox;
    invocation.resume_session = args.session_id;
    invocation.model = args.model;
    invocation.profile = args.profile;
    invocation.images = args.images;
    invocation.yolo = args.yolo;
    invocation.skip_git_repo_check = !args.no_skip_git_repo_check;

    let bridge = Bridge::from_config(&config)?;

    tokio::select! {
        report = bridge.run(&invocation, options) => report,
        () = shutdown_signal() => {
            warn!("shutdown signal received, abandoning run");
            Ok(RunReport::failure("[interrupted] received a shutdown signal before the run finished"))
        }
    }
}

fn print_report(report: &RunReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(err) => error!(%err, "failed to serialise report"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, quiet: bool) -> Result<()> {
    let default_level = if quiet { "warn" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
