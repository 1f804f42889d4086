//! Unit tests for the background stream reader.

use std::time::Duration;

use futures_util::stream;
use tokio_util::sync::CancellationToken;

use agent_bridge::process::Terminator;
use agent_bridge::stream::{line_queue, run_reader, Frame, LineReceiver, Polled, ReaderExit};
use agent_bridge::{AppError, Result};

const WAIT: Duration = Duration::from_millis(20);
const SENTINEL: &str = r#"{"type":"turn.completed"}"#;

fn frames(lines: &[&str]) -> Vec<Result<Frame>> {
    lines
        .iter()
        .map(|line| Ok(Frame::Line((*line).to_owned())))
        .collect()
}

async fn collect(rx: &mut LineReceiver) -> (Vec<String>, bool) {
    let mut lines = Vec::new();
    loop {
        match rx.poll(WAIT).await {
            Polled::Line(line) => lines.push(line),
            Polled::Oversized { limit } => lines.push(format!("<oversized {limit}>")),
            Polled::Finished => return (lines, true),
            Polled::Empty => return (lines, false),
        }
    }
}

#[tokio::test]
async fn forwards_every_line_then_finishes_at_eof() {
    let (tx, mut rx) = line_queue();
    let input = stream::iter(frames(&["one", "two", "three"]));

    let exit = run_reader(input, tx, Terminator::detached(), Duration::ZERO, CancellationToken::new()).await;

    assert_eq!(exit, ReaderExit::Eof);
    let (lines, finished) = collect(&mut rx).await;
    assert_eq!(lines, ["one", "two", "three"]);
    assert!(finished);
}

#[tokio::test]
async fn trailing_whitespace_is_stripped() {
    let (tx, mut rx) = line_queue();
    let input = stream::iter(frames(&["{\"a\":1}\r", "text  \t"]));

    run_reader(input, tx, Terminator::detached(), Duration::ZERO, CancellationToken::new()).await;

    let (lines, _) = collect(&mut rx).await;
    assert_eq!(lines, ["{\"a\":1}", "text"]);
}

/// The sentinel is forwarded, graceful shutdown is requested, and nothing
/// after it is read.
#[tokio::test]
async fn sentinel_stops_reading_and_requests_shutdown() {
    let (tx, mut rx) = line_queue();
    let terminator = Terminator::detached();
    let input = stream::iter(frames(&["before", SENTINEL, "after"]));

    let exit = run_reader(input, tx, terminator.clone(), Duration::ZERO, CancellationToken::new()).await;

    assert_eq!(exit, ReaderExit::Sentinel);
    assert!(terminator.graceful_requested());
    let (lines, finished) = collect(&mut rx).await;
    assert_eq!(lines, ["before", SENTINEL]);
    assert!(finished);
}

/// A non-JSON line is forwarded unchanged and is not mistaken for the sentinel.
#[tokio::test]
async fn malformed_lines_are_forwarded() {
    let (tx, mut rx) = line_queue();
    let terminator = Terminator::detached();
    let input = stream::iter(frames(&["not json {", "turn.completed"]));

    let exit = run_reader(input, tx, terminator.clone(), Duration::ZERO, CancellationToken::new()).await;

    assert_eq!(exit, ReaderExit::Eof);
    assert!(!terminator.graceful_requested());
    let (lines, _) = collect(&mut rx).await;
    assert_eq!(lines, ["not json {", "turn.completed"]);
}

/// A discarded line leaves a marker in its place so the loss is recorded.
#[tokio::test]
async fn oversized_frames_are_forwarded_as_markers() {
    let (tx, mut rx) = line_queue();
    let input = stream::iter(vec![
        Ok(Frame::Line("a".into())),
        Ok(Frame::Oversized { limit: 8 }),
        Ok(Frame::Line("b".into())),
    ]);

    run_reader(input, tx, Terminator::detached(), Duration::ZERO, CancellationToken::new()).await;

    assert_eq!(rx.poll(WAIT).await, Polled::Line("a".into()));
    assert_eq!(rx.poll(WAIT).await, Polled::Oversized { limit: 8 });
    assert_eq!(rx.poll(WAIT).await, Polled::Line("b".into()));
    assert_eq!(rx.poll(WAIT).await, Polled::Finished);
}

#[tokio::test]
async fn stream_error_still_enqueues_end_marker() {
    let (tx, mut rx) = line_queue();
    let input = stream::iter(vec![
        Ok(Frame::Line("kept".into())),
        Err(AppError::Io("pipe broke".into())),
        Ok(Frame::Line("never".into())),
    ]);

    let exit = run_reader(input, tx, Terminator::detached(), Duration::ZERO, CancellationToken::new()).await;

    assert_eq!(exit, ReaderExit::ReadError);
    let (lines, finished) = collect(&mut rx).await;
    assert_eq!(lines, ["kept"]);
    assert!(finished);
}

#[tokio::test]
async fn cancellation_stops_a_silent_stream() {
    let (tx, mut rx) = line_queue();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let exit = run_reader(
        stream::pending::<Result<Frame>>(),
        tx,
        Terminator::detached(),
        Duration::ZERO,
        cancel,
    )
    .await;

    assert_eq!(exit, ReaderExit::Cancelled);
    assert_eq!(rx.poll(WAIT).await, Polled::Finished);
}

#[tokio::test]
async fn dropped_consumer_stops_the_reader() {
    let (tx, rx) = line_queue();
    drop(rx);
    let input = stream::iter(frames(&["x", "y"]));

    let exit = run_reader(input, tx, Terminator::detached(), Duration::ZERO, CancellationToken::new()).await;
    assert_eq!(exit, ReaderExit::ConsumerGone);
}
