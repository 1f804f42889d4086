//! Unit tests for wire event decoding and classification.

use regex::Regex;
use serde_json::json;

use agent_bridge::session::{
    classify, decode_line, is_turn_completed, timeout_event, Decoded, DecodedEvent, Event,
    ItemEvent, RECONNECT_PATTERN,
};

fn transient() -> Regex {
    Regex::new(RECONNECT_PATTERN).expect("pattern compiles")
}

fn decode(line: &str) -> DecodedEvent {
    match decode_line(line, &transient()) {
        Decoded::Event(event) => *event,
        other => panic!("expected an event for {line}, got {other:?}"),
    }
}

// ── Line decoding ───────────────────────────────────────────────────────────

#[test]
fn blank_lines_are_skipped() {
    assert_eq!(decode_line("", &transient()), Decoded::Blank);
    assert_eq!(decode_line("   \t", &transient()), Decoded::Blank);
}

#[test]
fn non_json_is_malformed() {
    assert!(matches!(
        decode_line("Reading prompt from stdin...", &transient()),
        Decoded::Malformed { .. }
    ));
}

/// Valid JSON that is not an object cannot be an event.
#[test]
fn json_scalars_and_arrays_are_malformed() {
    assert!(matches!(decode_line("42", &transient()), Decoded::Malformed { .. }));
    assert!(matches!(decode_line("[1,2]", &transient()), Decoded::Malformed { .. }));
}

// ── Top-level types ─────────────────────────────────────────────────────────

#[test]
fn thread_started_carries_the_session_id() {
    let decoded = decode(r#"{"type":"thread.started","thread_id":"abc123"}"#);
    assert_eq!(
        decoded.event,
        Event::ThreadStarted {
            thread_id: "abc123".into()
        }
    );
    assert_eq!(decoded.thread_id.as_deref(), Some("abc123"));
}

/// Any event type may carry a thread id.
#[test]
fn thread_id_is_surfaced_on_other_events() {
    let decoded = decode(r#"{"type":"turn.started","thread_id":"t-9"}"#);
    assert_eq!(decoded.thread_id.as_deref(), Some("t-9"));
    assert!(matches!(decoded.event, Event::Acknowledged { .. }));
}

#[test]
fn empty_thread_id_is_ignored() {
    let decoded = decode(r#"{"type":"thread.started","thread_id":""}"#);
    assert_eq!(decoded.thread_id, None);
}

#[test]
fn turn_completed_is_recognised() {
    assert_eq!(decode(r#"{"type":"turn.completed","usage":{}}"#).event, Event::TurnCompleted);
}

#[test]
fn failure_types_use_nested_message() {
    let decoded = decode(r#"{"type":"turn.failed","error":{"message":"quota exhausted"}}"#);
    assert_eq!(
        decoded.event,
        Event::Failure {
            message: "quota exhausted".into()
        }
    );
}

#[test]
fn error_types_use_flat_message() {
    let decoded = decode(r#"{"type":"error","message":"stream disconnected"}"#);
    assert_eq!(
        decoded.event,
        Event::Error {
            message: "stream disconnected".into(),
            transient: false
        }
    );
}

#[test]
fn reconnect_notice_is_transient() {
    let decoded = decode(r#"{"type":"error","message":"Reconnecting... 2/5"}"#);
    assert_eq!(
        decoded.event,
        Event::Error {
            message: "Reconnecting... 2/5".into(),
            transient: true
        }
    );
}

/// Near misses of the reconnect wording are ordinary errors.
#[test]
fn reconnect_pattern_is_anchored() {
    let decoded = decode(r#"{"type":"error","message":"Reconnecting... 2/5 failed for good"}"#);
    assert!(matches!(decoded.event, Event::Error { transient: false, .. }));
}

#[test]
fn response_events_are_acknowledged() {
    for kind in ["turn.started", "response.created", "response.completed"] {
        let decoded = classify(json!({ "type": kind }), &transient());
        assert_eq!(decoded.event, Event::Acknowledged { kind: kind.into() });
    }
}

#[test]
fn unknown_and_missing_types_are_unrecognized() {
    assert_eq!(
        decode(r#"{"type":"session.configured"}"#).event,
        Event::Unrecognized {
            kind: "session.configured".into()
        }
    );
    assert_eq!(
        decode(r#"{"payload":1}"#).event,
        Event::Unrecognized { kind: String::new() }
    );
}

#[test]
fn timeout_event_is_built_locally() {
    let decoded = timeout_event(600);
    assert_eq!(
        decoded.event,
        Event::Timeout {
            message: "execution exceeded 600s timeout limit".into()
        }
    );
    assert_eq!(decoded.thread_id, None);
    assert_eq!(decoded.raw["type"], "timeout");
    assert_eq!(
        decoded.raw["error"]["message"],
        "execution exceeded 600s timeout limit"
    );
}

/// Only the supervisor produces timeouts; one on the wire is just unknown.
#[test]
fn wire_timeout_is_unrecognized() {
    let decoded = decode(r#"{"type":"timeout","error":{"message":"fake"}}"#);
    assert_eq!(
        decoded.event,
        Event::Unrecognized {
            kind: "timeout".into()
        }
    );
}

// ── Items ───────────────────────────────────────────────────────────────────

#[test]
fn agent_message_item() {
    let decoded = decode(
        r#"{"type":"item.completed","item":{"id":"i1","type":"agent_message","text":"Hello"}}"#,
    );
    assert_eq!(
        decoded.event,
        Event::Item(ItemEvent::AgentMessage {
            text: "Hello".into()
        })
    );
}

#[test]
fn every_item_wrapper_type_is_accepted() {
    for kind in ["item.started", "item.created", "item.updated", "item.completed"] {
        let decoded = classify(
            json!({ "type": kind, "item": { "type": "reasoning", "text": "thinking" } }),
            &transient(),
        );
        assert_eq!(
            decoded.event,
            Event::Item(ItemEvent::Reasoning {
                text: "thinking".into()
            })
        );
    }
}

#[test]
fn function_call_arguments_default_to_empty_object() {
    let decoded = decode(r#"{"type":"item.completed","item":{"type":"function_call","name":"ls"}}"#);
    assert_eq!(
        decoded.event,
        Event::Item(ItemEvent::FunctionCall {
            name: "ls".into(),
            arguments: "{}".into()
        })
    );
}

#[test]
fn function_call_output_falls_back_across_fields() {
    let decoded = decode(
        r#"{"type":"item.completed","item":{"type":"function_call_output","content":"done"}}"#,
    );
    assert_eq!(
        decoded.event,
        Event::Item(ItemEvent::FunctionCallOutput {
            output: "done".into()
        })
    );
}

#[test]
fn command_execution_reports_output_once_finished() {
    let started = decode(
        r#"{"type":"item.started","item":{"type":"command_execution","command":"ls","aggregated_output":""}}"#,
    );
    assert_eq!(
        started.event,
        Event::Item(ItemEvent::CommandExecution {
            command: "ls".into(),
            aggregated_output: None,
            exit_code: None
        })
    );

    let finished = decode(
        r#"{"type":"item.completed","item":{"type":"command_execution","command":"ls","aggregated_output":"a\nb","exit_code":0}}"#,
    );
    assert_eq!(
        finished.event,
        Event::Item(ItemEvent::CommandExecution {
            command: "ls".into(),
            aggregated_output: Some("a\nb".into()),
            exit_code: Some(0)
        })
    );
}

#[test]
fn unknown_item_type_is_kept() {
    let decoded = decode(r#"{"type":"item.completed","item":{"type":"web_search"}}"#);
    assert_eq!(
        decoded.event,
        Event::Item(ItemEvent::Unknown {
            item_type: "web_search".into()
        })
    );
}

// ── Sentinel detection ──────────────────────────────────────────────────────

#[test]
fn sentinel_detection() {
    assert!(is_turn_completed(r#"{"type":"turn.completed"}"#));
    assert!(!is_turn_completed(r#"{"type":"turn.started"}"#));
    assert!(!is_turn_completed("turn.completed"));
    assert!(!is_turn_completed(""));
}
