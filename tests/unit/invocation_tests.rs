//! Unit tests for the agent argument vector.

use std::str::FromStr;

use agent_bridge::invocation::{Invocation, SandboxPolicy};
use agent_bridge::process::{EnvMap, Platform};

fn basic() -> Invocation {
    Invocation::new("fix the tests", "/work/repo")
}

#[test]
fn minimal_argument_vector() {
    assert_eq!(
        basic().args(Platform::Unix),
        [
            "exec",
            "--sandbox",
            "read-only",
            "--cd",
            "/work/repo",
            "--json",
            "--skip-git-repo-check",
            "--",
            "fix the tests",
        ]
    );
}

#[test]
fn full_argument_vector_keeps_documented_order() {
    let mut invocation = basic();
    invocation.sandbox = SandboxPolicy::WorkspaceWrite;
    invocation.images = vec!["a.png,b.png".into(), "c.png".into()];
    invocation.model = Some("gpt-5".into());
    invocation.profile = Some("ci".into());
    invocation.yolo = true;
    invocation.resume_session = Some("abc123".into());

    assert_eq!(
        invocation.args(Platform::Unix),
        [
            "exec",
            "--sandbox",
            "workspace-write",
            "--cd",
            "/work/repo",
            "--json",
            "--image",
            "a.png,b.png,c.png",
            "--model",
            "gpt-5",
            "--profile",
            "ci",
            "--yolo",
            "--skip-git-repo-check",
            "resume",
            "abc123",
            "--",
            "fix the tests",
        ]
    );
}

#[test]
fn empty_optional_values_are_omitted() {
    let mut invocation = basic();
    invocation.model = Some(String::new());
    invocation.resume_session = Some(String::new());
    invocation.images = vec![" , ".into()];
    invocation.skip_git_repo_check = false;

    let args = invocation.args(Platform::Unix);
    assert!(!args.iter().any(|a| a == "--model" || a == "resume" || a == "--image"));
    assert!(!args.iter().any(|a| a == "--skip-git-repo-check"));
}

/// A prompt that looks like a flag stays after the `--` separator.
#[test]
fn prompt_is_always_last_after_separator() {
    let invocation = Invocation::new("--help", "/w");
    let args = invocation.args(Platform::Unix);
    assert_eq!(&args[args.len() - 2..], ["--", "--help"]);
}

#[test]
fn windows_prompt_control_characters_are_escaped() {
    let invocation = Invocation::new("line one\nline two\r\n\tindented", "C:\\w");
    let args = invocation.args(Platform::Windows);
    assert_eq!(
        args.last().map(String::as_str),
        Some("line one\\nline two\\r\\n\\tindented")
    );

    let unix = invocation.args(Platform::Unix);
    assert_eq!(unix.last().map(String::as_str), Some("line one\nline two\r\n\tindented"));
}

#[test]
fn launch_request_uses_workspace_as_working_dir() {
    let mut env = EnvMap::new();
    env.insert("PATH".into(), "/usr/bin".into());
    let mut invocation = basic();
    invocation.command = "my-agent".into();

    let request = invocation.launch_request(env.clone(), Platform::Unix);
    assert_eq!(request.program, "my-agent");
    assert_eq!(request.working_dir, std::path::PathBuf::from("/work/repo"));
    assert_eq!(request.env, env);
    assert_eq!(request.args.first().map(String::as_str), Some("exec"));
}

#[test]
fn sandbox_policy_spellings() {
    for policy in [
        SandboxPolicy::ReadOnly,
        SandboxPolicy::WorkspaceWrite,
        SandboxPolicy::DangerFullAccess,
    ] {
        assert_eq!(SandboxPolicy::from_str(policy.as_str()).expect("parses"), policy);
        assert_eq!(policy.to_string(), policy.as_str());
    }
    assert!(SandboxPolicy::from_str("full").is_err());
    assert_eq!(SandboxPolicy::default(), SandboxPolicy::ReadOnly);
}

#[test]
fn sandbox_policy_serde_is_kebab_case() {
    let json = serde_json::to_string(&SandboxPolicy::DangerFullAccess).expect("serialise");
    assert_eq!(json, "\"danger-full-access\"");
}
