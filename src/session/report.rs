//! Final report assembly.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::classifier::{Diagnostic, SessionResult};

/// Separator placed between diagnostics in the `error` field.
pub const DIAGNOSTIC_SEPARATOR: &str = "\n\n";

/// The JSON document printed for the caller.
///
/// Optional keys are omitted rather than serialised as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Whether the run succeeded.
    pub success: bool,
    /// Session identifier, usable with `--session-id` to resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Concatenated agent message text; present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_text: Option<String>,
    /// Diagnostics joined by blank lines; present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diagnostics recorded during a run that still succeeded, such as
    /// undecodable or discarded lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    /// Every decoded event, in full-trace mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_events: Option<Vec<Value>>,
}

impl RunReport {
    /// Report for a run that never produced a stream, e.g. a launch error.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            agent_text: None,
            error: Some(message.into()),
            warnings: None,
            all_events: None,
        }
    }
}

/// Apply the end-of-stream checks and build the report.
///
/// A run that is still successful at this point is demoted when it never
/// reported a session id or never produced agent text. A run that already
/// failed keeps its original diagnostics without these additions.
#[must_use]
pub fn aggregate(mut result: SessionResult) -> RunReport {
    if result.is_success() && result.session_id().is_none() {
        result.fail(Diagnostic::MissingSessionId);
    }
    if result.is_success() && result.agent_text().is_empty() {
        result.fail(Diagnostic::MissingAgentText);
    }

    let turn_completed = result.turn_completed();
    let events_seen = result.events_seen();
    let (success, session_id, agent_text, diagnostics, all_events) = result.into_parts();

    info!(
        success,
        turn_completed,
        events_seen,
        diagnostics = diagnostics.len(),
        "session finished"
    );

    let (error, warnings) = if success {
        let warnings = (!diagnostics.is_empty())
            .then(|| diagnostics.iter().map(ToString::to_string).collect());
        (None, warnings)
    } else {
        (Some(join_diagnostics(&diagnostics)), None)
    };
    RunReport {
        success,
        session_id,
        agent_text: success.then_some(agent_text),
        error,
        warnings,
        all_events,
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(DIAGNOSTIC_SEPARATOR)
}
