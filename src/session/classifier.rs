//! Folds the child's event stream into a [`SessionResult`].
//!
//! | Event                          | Effect                                          |
//! |--------------------------------|-------------------------------------------------|
//! | any event with `thread_id`     | sets `session_id` if still unset                |
//! | `agent_message` item           | appends text to `agent_text`                    |
//! | failure / non-transient error  | logs message; demotes only before any output    |
//! | transient reconnect notice     | ignored                                         |
//! | timeout                        | demotes; logs a diagnostic with partial output  |
//! | malformed line                 | logs a diagnostic; success unchanged            |
//! | over-long line (discarded)     | logs a diagnostic; success unchanged            |
//! | everything else                | trace only                                      |
//!
//! Lines are processed strictly in arrival order.

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::event::{decode_line, timeout_event, Decoded, DecodedEvent, Event, ItemEvent};
use crate::supervisor::LineSink;

/// Characters of partial output quoted in a timeout diagnostic by default.
pub const PARTIAL_PREVIEW_CHARS: usize = 200;

/// Characters of text shown in per-event log lines.
const LOG_SNIPPET_CHARS: usize = 120;

/// The run's success flag.
///
/// Starts successful and can only be demoted; there is deliberately no way
/// to set it back to `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessFlag(bool);

impl SuccessFlag {
    /// A flag that has not been demoted.
    #[must_use]
    pub const fn new() -> Self {
        Self(true)
    }

    /// Current value.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0
    }

    /// Unconditionally mark the run as failed.
    pub fn demote(&mut self) {
        self.0 = false;
    }

    /// Mark the run as failed only if no agent output exists yet.
    ///
    /// A fault reported after the agent already answered does not erase the
    /// answer; it never promotes a failed run either.
    pub fn demote_unless_output(&mut self, agent_text: &str) {
        if agent_text.is_empty() {
            self.0 = false;
        }
    }
}

impl Default for SuccessFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A failure or error event reported by the child.
    Agent {
        /// Message as reported.
        message: String,
    },
    /// A line that was not a JSON object.
    Decode {
        /// The raw line.
        line: String,
    },
    /// A line over the length limit was discarded unread.
    Oversized {
        /// The limit in effect, in bytes.
        limit: usize,
    },
    /// The wall-clock deadline passed.
    Timeout {
        /// Description of the limit.
        message: String,
        /// Prefix of the agent text captured before the deadline.
        partial: Option<String>,
    },
    /// The stream ended without a session id.
    MissingSessionId,
    /// The stream ended without any agent text.
    MissingAgentText,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent { message } => write!(f, "[agent error] {message}"),
            Self::Decode { line } => write!(f, "[json decode error] {line}"),
            Self::Oversized { limit } => write!(
                f,
                "[oversized line] a line longer than {limit} bytes was discarded"
            ),
            Self::Timeout { message, partial } => {
                write!(
                    f,
                    "[timeout] {message}; try a larger --timeout (for example 1200 seconds)"
                )?;
                if let Some(partial) = partial {
                    write!(f, "\n\npartial results: {partial}")?;
                }
                Ok(())
            }
            Self::MissingSessionId => {
                write!(f, "[protocol error] the child never reported a session id")
            }
            Self::MissingAgentText => write!(
                f,
                "[protocol error] the child never produced an agent message; rerun with \
                 --return-all-events to inspect the full event trace"
            ),
        }
    }
}

/// Running accumulator for one session.
#[derive(Debug, Clone)]
pub struct SessionResult {
    success: SuccessFlag,
    session_id: Option<String>,
    agent_text: String,
    diagnostics: Vec<Diagnostic>,
    all_events: Option<Vec<Value>>,
    turn_completed: bool,
    events_seen: usize,
}

impl SessionResult {
    /// Empty accumulator; `full_trace` enables event retention.
    #[must_use]
    pub fn new(full_trace: bool) -> Self {
        Self {
            success: SuccessFlag::new(),
            session_id: None,
            agent_text: String::new(),
            diagnostics: Vec::new(),
            all_events: full_trace.then(Vec::new),
            turn_completed: false,
            events_seen: 0,
        }
    }

    /// Whether the run is still considered successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success.is_success()
    }

    /// Session identifier, once reported.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Concatenated agent message text.
    #[must_use]
    pub fn agent_text(&self) -> &str {
        &self.agent_text
    }

    /// Diagnostics in the order they were recorded.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Retained events, when full-trace mode is on.
    #[must_use]
    pub fn all_events(&self) -> Option<&[Value]> {
        self.all_events.as_deref()
    }

    /// Whether the turn-completion sentinel was classified.
    #[must_use]
    pub fn turn_completed(&self) -> bool {
        self.turn_completed
    }

    /// Number of JSON events classified so far.
    #[must_use]
    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    /// Demote the run and record why.
    pub(crate) fn fail(&mut self, diagnostic: Diagnostic) {
        self.success.demote();
        self.diagnostics.push(diagnostic);
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (bool, Option<String>, String, Vec<Diagnostic>, Option<Vec<Value>>) {
        (
            self.success.is_success(),
            self.session_id,
            self.agent_text,
            self.diagnostics,
            self.all_events,
        )
    }
}

/// Options for an [`EventClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    /// Retain every decoded event for the report.
    pub full_trace: bool,
    /// Characters of partial output quoted on timeout.
    pub partial_preview_chars: usize,
    /// Pattern identifying transient reconnect notices.
    pub transient_pattern: Regex,
}

/// Decodes lines and applies them to a [`SessionResult`].
#[derive(Debug)]
pub struct EventClassifier {
    result: SessionResult,
    transient: Regex,
    partial_preview_chars: usize,
    started: Instant,
}

impl EventClassifier {
    /// Classifier with an empty accumulator.
    #[must_use]
    pub fn new(options: ClassifierOptions) -> Self {
        Self {
            result: SessionResult::new(options.full_trace),
            transient: options.transient_pattern,
            partial_preview_chars: options.partial_preview_chars,
            started: Instant::now(),
        }
    }

    /// Read-only view of the accumulator.
    #[must_use]
    pub fn result(&self) -> &SessionResult {
        &self.result
    }

    /// Hand the accumulator to the aggregator.
    #[must_use]
    pub fn finish(self) -> SessionResult {
        self.result
    }

    /// Decode one raw line and apply it.
    pub fn ingest_line(&mut self, line: &str) {
        match decode_line(line, &self.transient) {
            Decoded::Event(decoded) => self.apply(*decoded),
            Decoded::Blank => {}
            Decoded::Malformed { reason } => {
                debug!(%reason, line, "line is not a JSON object");
                self.result.diagnostics.push(Diagnostic::Decode {
                    line: line.to_owned(),
                });
            }
        }
    }

    /// Record a line that was discarded for exceeding `limit` bytes.
    pub fn record_oversized(&mut self, limit: usize) {
        debug!(limit, "recording discarded over-long line");
        self.result.diagnostics.push(Diagnostic::Oversized { limit });
    }

    /// Apply the synthetic timeout event for a deadline of `limit`.
    pub fn record_timeout(&mut self, limit: Duration) {
        self.apply(timeout_event(limit.as_secs()));
    }

    /// Apply one decoded event.
    pub fn apply(&mut self, decoded: DecodedEvent) {
        let DecodedEvent {
            event,
            thread_id,
            raw,
        } = decoded;
        let result = &mut self.result;
        result.events_seen += 1;

        if let Some(events) = result.all_events.as_mut() {
            events.push(raw);
        }

        if result.session_id.is_none() {
            if let Some(id) = thread_id {
                info!(session_id = %id, "session started");
                result.session_id = Some(id);
            }
        }

        match event {
            Event::Item(item) => log_item(&item, &mut result.agent_text),
            Event::TurnCompleted => {
                result.turn_completed = true;
                info!(
                    elapsed_secs = self.started.elapsed().as_secs(),
                    "turn completed"
                );
            }
            Event::Failure { message }
            | Event::Error {
                message,
                transient: false,
            } => {
                warn!(message = %snippet(&message), "child reported an error");
                result.success.demote_unless_output(&result.agent_text);
                result.diagnostics.push(Diagnostic::Agent { message });
            }
            Event::Error {
                message,
                transient: true,
            } => {
                debug!(%message, "ignoring transient reconnect notice");
            }
            Event::Timeout { message } => {
                warn!(%message, "deadline exceeded");
                let partial: Option<String> = (!result.agent_text.is_empty()).then(|| {
                    result
                        .agent_text
                        .chars()
                        .take(self.partial_preview_chars)
                        .collect()
                });
                result.fail(Diagnostic::Timeout { message, partial });
            }
            Event::ThreadStarted { .. } | Event::Acknowledged { .. } => {}
            Event::Unrecognized { kind } => debug!(kind, "unrecognized event type"),
        }
    }
}

impl LineSink for EventClassifier {
    fn accept_line(&mut self, line: &str) {
        self.ingest_line(line);
    }

    fn accept_oversized(&mut self, limit: usize) {
        self.record_oversized(limit);
    }

    fn accept_timeout(&mut self, limit: Duration) {
        self.record_timeout(limit);
    }
}

/// Log an item and append agent text.
fn log_item(item: &ItemEvent, agent_text: &mut String) {
    match item {
        ItemEvent::AgentMessage { text } => {
            debug!(text = %snippet(text), "agent message");
            agent_text.push_str(text);
        }
        ItemEvent::FunctionCall { name, arguments } => {
            debug!(name, arguments = %snippet(arguments), "function call");
        }
        ItemEvent::FunctionCallOutput { output } => {
            debug!(output = %snippet(output), "function call output");
        }
        ItemEvent::CommandExecution {
            command,
            aggregated_output: Some(output),
            exit_code,
        } => {
            debug!(
                command = %snippet(command),
                ?exit_code,
                output = %snippet(output),
                "command finished"
            );
        }
        ItemEvent::CommandExecution { command, .. } => {
            debug!(command = %snippet(command), "command started");
        }
        ItemEvent::Reasoning { text } => debug!(text = %snippet(text), "reasoning"),
        ItemEvent::Unknown { item_type } => debug!(item_type, "unrecognized item type"),
    }
}

/// Collapse whitespace and bound the length of text destined for a log line.
fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= LOG_SNIPPET_CHARS {
        collapsed
    } else {
        let mut short: String = collapsed.chars().take(LOG_SNIPPET_CHARS).collect();
        short.push('…');
        short
    }
}
