//! Wire events emitted by the child, one JSON object per line.
//!
//! | Top-level `type`                         | Decoded as                     |
//! |------------------------------------------|--------------------------------|
//! | `thread.started`                         | [`Event::ThreadStarted`]       |
//! | `turn.completed`                         | [`Event::TurnCompleted`]       |
//! | `item.started` / `.created` / `.updated` / `.completed` | [`Event::Item`] |
//! | anything containing `fail`               | [`Event::Failure`]             |
//! | anything containing `error`              | [`Event::Error`]               |
//! | `turn.started`, `response.*`             | [`Event::Acknowledged`]        |
//! | *(anything else, including `timeout`)*   | [`Event::Unrecognized`]        |
//!
//! [`Event::Timeout`] never comes from the wire; [`timeout_event`] builds it
//! locally when the deadline passes.
//!
//! Any event may also carry a top-level `thread_id`, which is surfaced
//! separately on [`DecodedEvent`].

use regex::Regex;
use serde_json::{json, Value};

/// Top-level type of the turn-completion sentinel.
pub const TURN_COMPLETED: &str = "turn.completed";

/// Default pattern of the transient reconnect notice.
pub const RECONNECT_PATTERN: &str = r"^Reconnecting\.\.\.\s+\d+/\d+$";

const ITEM_TYPES: &[&str] = &["item.started", "item.created", "item.updated", "item.completed"];
const ACKNOWLEDGED_TYPES: &[&str] = &["turn.started", "response.created", "response.completed"];

/// Payload of an `item.*` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    /// Text addressed to the caller.
    AgentMessage {
        /// Message text; may be empty while the item is still streaming.
        text: String,
    },
    /// Tool invocation by the agent.
    FunctionCall {
        /// Tool name.
        name: String,
        /// Raw argument payload.
        arguments: String,
    },
    /// Result of a tool invocation.
    FunctionCallOutput {
        /// Output text, taken from `output`, `content` or `result`.
        output: String,
    },
    /// Shell command run by the agent.
    CommandExecution {
        /// Command line.
        command: String,
        /// Combined output, once the command finished.
        aggregated_output: Option<String>,
        /// Exit code, once the command finished.
        exit_code: Option<i64>,
    },
    /// Reasoning summary.
    Reasoning {
        /// Reasoning text.
        text: String,
    },
    /// Any other item type.
    Unknown {
        /// The item's `type` field.
        item_type: String,
    },
}

/// A classified wire event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A session started.
    ThreadStarted {
        /// Session identifier.
        thread_id: String,
    },
    /// An `item.*` event.
    Item(ItemEvent),
    /// End of the agent's turn.
    TurnCompleted,
    /// A failure reported by the child (`turn.failed` and similar).
    Failure {
        /// Message from `error.message`.
        message: String,
    },
    /// An error notice reported by the child.
    Error {
        /// Message from `message`.
        message: String,
        /// Whether the notice is a transient reconnect announcement.
        transient: bool,
    },
    /// Synthetic event: the wall-clock deadline passed.
    Timeout {
        /// Human-readable description of the limit.
        message: String,
    },
    /// Framing events that need no handling.
    Acknowledged {
        /// Top-level type.
        kind: String,
    },
    /// Any other top-level type, including a missing one.
    Unrecognized {
        /// Top-level type, possibly empty.
        kind: String,
    },
}

/// One successfully parsed line.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    /// Classification of the line.
    pub event: Event,
    /// Top-level `thread_id`, if present on any event type.
    pub thread_id: Option<String>,
    /// The parsed JSON, kept for full-trace output.
    pub raw: Value,
}

/// Outcome of decoding one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A JSON object was parsed and classified.
    Event(Box<DecodedEvent>),
    /// The line was blank.
    Blank,
    /// The line was not a JSON object.
    Malformed {
        /// Parser message.
        reason: String,
    },
}

/// Decode and classify one line.
///
/// `transient` decides which `error` messages are reconnect notices.
#[must_use]
pub fn decode_line(line: &str, transient: &Regex) -> Decoded {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Decoded::Blank;
    }

    let raw: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            return Decoded::Malformed {
                reason: err.to_string(),
            }
        }
    };
    if !raw.is_object() {
        return Decoded::Malformed {
            reason: "expected a JSON object".into(),
        };
    }

    Decoded::Event(Box::new(classify(raw, transient)))
}

/// Classify an already-parsed JSON object.
#[must_use]
pub fn classify(raw: Value, transient: &Regex) -> DecodedEvent {
    let kind = str_field(&raw, "type");
    let thread_id = raw
        .get("thread_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned);

    let event = match kind.as_str() {
        "thread.started" => Event::ThreadStarted {
            thread_id: thread_id.clone().unwrap_or_default(),
        },
        TURN_COMPLETED => Event::TurnCompleted,
        k if ITEM_TYPES.contains(&k) => Event::Item(classify_item(raw.get("item"))),
        k if k.contains("fail") => Event::Failure {
            message: nested_message(&raw),
        },
        k if k.contains("error") => {
            let message = flat_message(&raw);
            Event::Error {
                transient: transient.is_match(&message),
                message,
            }
        }
        k if ACKNOWLEDGED_TYPES.contains(&k) => Event::Acknowledged { kind: kind.clone() },
        _ => Event::Unrecognized { kind: kind.clone() },
    };

    DecodedEvent {
        event,
        thread_id,
        raw,
    }
}

/// Whether `line` is the turn-completion sentinel.
///
/// Lines that are not JSON simply are not the sentinel.
#[must_use]
pub fn is_turn_completed(line: &str) -> bool {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|value| value.get("type").and_then(Value::as_str).map(|t| t == TURN_COMPLETED))
        .unwrap_or(false)
}

/// Build the synthetic timeout event for a limit of `limit_secs` seconds.
///
/// `raw` mirrors the event in the shape of a wire line for full-trace output.
#[must_use]
pub fn timeout_event(limit_secs: u64) -> DecodedEvent {
    let message = format!("execution exceeded {limit_secs}s timeout limit");
    let raw = json!({
        "type": "timeout",
        "error": { "message": &message }
    });
    DecodedEvent {
        event: Event::Timeout { message },
        thread_id: None,
        raw,
    }
}

fn classify_item(item: Option<&Value>) -> ItemEvent {
    let Some(item) = item else {
        return ItemEvent::Unknown {
            item_type: String::new(),
        };
    };

    match str_field(item, "type").as_str() {
        "agent_message" => ItemEvent::AgentMessage {
            text: str_field(item, "text"),
        },
        "function_call" => ItemEvent::FunctionCall {
            name: str_field(item, "name"),
            arguments: item
                .get("arguments")
                .map(text_of)
                .unwrap_or_else(|| "{}".to_owned()),
        },
        "function_call_output" => ItemEvent::FunctionCallOutput {
            output: first_text(item, &["output", "content", "result"]),
        },
        "command_execution" => ItemEvent::CommandExecution {
            command: str_field(item, "command"),
            aggregated_output: item
                .get("aggregated_output")
                .map(text_of)
                .filter(|out| !out.is_empty()),
            exit_code: item.get("exit_code").and_then(Value::as_i64),
        },
        "reasoning" => ItemEvent::Reasoning {
            text: first_text(item, &["text", "content"]),
        },
        other => ItemEvent::Unknown {
            item_type: other.to_owned(),
        },
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Render a JSON value as text; strings are taken verbatim.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_text(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .map(text_of)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// `error.message`, falling back to a top-level `message`.
fn nested_message(raw: &Value) -> String {
    raw.get("error")
        .and_then(|err| err.get("message"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| str_field(raw, "message"))
}

/// Top-level `message`, falling back to `error.message`.
fn flat_message(raw: &Value) -> String {
    match raw.get("message").and_then(Value::as_str) {
        Some(message) => message.to_owned(),
        None => nested_message(raw),
    }
}
