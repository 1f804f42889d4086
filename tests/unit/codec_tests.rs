//! Unit tests for the output line codec and merged output streams.

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio_util::codec::Decoder;

use agent_bridge::process::merge_output;
use agent_bridge::stream::{Frame, LineCodec};

fn line(text: &str) -> Option<Frame> {
    Some(Frame::Line(text.to_owned()))
}

// ── Framing ─────────────────────────────────────────────────────────────────

#[test]
fn single_line_is_returned_without_newline() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"turn.started\"}\n");

    let frame = codec.decode(&mut buf).expect("decode");
    assert_eq!(frame, line("{\"type\":\"turn.started\"}"));
}

#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("first\nsecond\n");

    assert_eq!(codec.decode(&mut buf).expect("first"), line("first"));
    assert_eq!(codec.decode(&mut buf).expect("second"), line("second"));
    assert_eq!(codec.decode(&mut buf).expect("empty"), None);
}

/// A fragment without its newline is held back until the rest arrives.
#[test]
fn partial_line_waits_for_newline() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"type\":");
    assert_eq!(codec.decode(&mut buf).expect("partial"), None);

    buf.extend_from_slice(b"\"x\"}\n");
    assert_eq!(codec.decode(&mut buf).expect("complete"), line("{\"type\":\"x\"}"));
}

/// The last line of a stream does not need a trailing newline.
#[test]
fn unterminated_final_line_is_flushed_at_eof() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("tail");

    assert_eq!(codec.decode(&mut buf).expect("no newline"), None);
    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), line("tail"));
}

#[test]
fn invalid_utf8_is_decoded_lossily() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(&b"ok \xff bytes\n"[..]);

    let frame = codec.decode(&mut buf).expect("decode");
    assert_eq!(frame, line("ok \u{fffd} bytes"));
}

// ── Size limit ──────────────────────────────────────────────────────────────

/// An over-long line becomes a marker frame and the codec keeps going.
#[test]
fn oversized_line_is_reported_and_skipped() {
    let mut codec = LineCodec::with_max_length(8);
    let mut buf = BytesMut::from("this line is far too long\nshort\n");

    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(&mut buf).expect("decode") {
        frames.push(frame);
    }

    assert_eq!(frames.first(), Some(&Frame::Oversized { limit: 8 }));
    assert_eq!(frames.last(), Some(&Frame::Line("short".to_owned())));
}

// ── Merged output ───────────────────────────────────────────────────────────

/// Lines from both pipes arrive, each pipe in its own order.
#[tokio::test]
async fn merged_output_keeps_per_pipe_order() {
    let stdout: &'static [u8] = b"o1\no2\no3\n";
    let stderr: &'static [u8] = b"e1\ne2\n";

    let lines: Vec<String> = merge_output(stdout, stderr, 1024)
        .filter_map(|item| async move {
            match item.expect("frame") {
                Frame::Line(line) => Some(line),
                Frame::Oversized { .. } => None,
            }
        })
        .collect()
        .await;

    assert_eq!(lines.len(), 5);
    let out: Vec<_> = lines.iter().filter(|l| l.starts_with('o')).collect();
    let err: Vec<_> = lines.iter().filter(|l| l.starts_with('e')).collect();
    assert_eq!(out, ["o1", "o2", "o3"]);
    assert_eq!(err, ["e1", "e2"]);
}
