//! Argument vector for one agent run.
//!
//! The layout is
//! `<cmd> exec --sandbox <policy> --cd <dir> --json [--image a,b] [--model m]
//! [--profile p] [--yolo] [--skip-git-repo-check] [resume <id>] -- <prompt>`.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::process::{EnvMap, LaunchRequest, Platform};
use crate::AppError;

/// Sandbox policy for commands the agent runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxPolicy {
    /// No writes anywhere.
    #[default]
    ReadOnly,
    /// Writes inside the working directory.
    WorkspaceWrite,
    /// No sandbox.
    DangerFullAccess,
}

impl SandboxPolicy {
    /// Wire spelling of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }
}

impl Display for SandboxPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read-only" => Ok(Self::ReadOnly),
            "workspace-write" => Ok(Self::WorkspaceWrite),
            "danger-full-access" => Ok(Self::DangerFullAccess),
            other => Err(AppError::Config(format!("unknown sandbox policy: {other}"))),
        }
    }
}

/// Everything the caller chooses about one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Logical name or path of the child executable.
    pub command: String,
    /// Instruction sent to the agent.
    pub prompt: String,
    /// Workspace root for the agent; also the child's working directory.
    pub working_dir: PathBuf,
    /// Sandbox policy.
    pub sandbox: SandboxPolicy,
    /// Session to resume instead of starting a new one.
    pub resume_session: Option<String>,
    /// Model override.
    pub model: Option<String>,
    /// Configuration profile override.
    pub profile: Option<String>,
    /// Image files attached to the prompt.
    pub images: Vec<String>,
    /// Run every command without approvals or sandboxing.
    pub yolo: bool,
    /// Allow running outside a Git repository.
    pub skip_git_repo_check: bool,
}

impl Invocation {
    /// Invocation with defaults for everything but the prompt and directory.
    #[must_use]
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: "codex".to_owned(),
            prompt: prompt.into(),
            working_dir: working_dir.into(),
            sandbox: SandboxPolicy::default(),
            resume_session: None,
            model: None,
            profile: None,
            images: Vec::new(),
            yolo: false,
            skip_git_repo_check: true,
        }
    }

    /// Image paths after splitting comma-separated entries.
    #[must_use]
    pub fn image_list(&self) -> Vec<String> {
        self.images
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Arguments following the program name.
    #[must_use]
    pub fn args(&self, platform: Platform) -> Vec<String> {
        let mut args = vec![
            "exec".to_owned(),
            "--sandbox".to_owned(),
            self.sandbox.as_str().to_owned(),
            "--cd".to_owned(),
            self.working_dir.to_string_lossy().into_owned(),
            "--json".to_owned(),
        ];

        let images = self.image_list();
        if !images.is_empty() {
            args.push("--image".to_owned());
            args.push(images.join(","));
        }

        if let Some(model) = non_empty(self.model.as_deref()) {
            args.push("--model".to_owned());
            args.push(model.to_owned());
        }

        if let Some(profile) = non_empty(self.profile.as_deref()) {
            args.push("--profile".to_owned());
            args.push(profile.to_owned());
        }

        if self.yolo {
            args.push("--yolo".to_owned());
        }

        if self.skip_git_repo_check {
            args.push("--skip-git-repo-check".to_owned());
        }

        if let Some(session) = non_empty(self.resume_session.as_deref()) {
            args.push("resume".to_owned());
            args.push(session.to_owned());
        }

        args.push("--".to_owned());
        args.push(platform.escape_prompt(&self.prompt));
        args
    }

    /// Launch request for this invocation with the given environment.
    #[must_use]
    pub fn launch_request(&self, env: EnvMap, platform: Platform) -> LaunchRequest {
        LaunchRequest {
            program: self.command.clone(),
            args: self.args(platform),
            working_dir: self.working_dir.clone(),
            env,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
