//! Background stream reader.
//!
//! Reads framed lines from the child's merged output, forwards each one to
//! the [`LineSender`] (over-long lines as a marker), and watches for the `turn.completed` sentinel. When
//! the sentinel is seen the reader waits a short grace interval so trailing
//! output can flush, asks the child to terminate gracefully, and stops
//! reading without waiting for EOF.
//!
//! Whatever ends the loop (EOF, I/O error, sentinel, cancellation), the end
//! marker is enqueued exactly once before the task returns.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::process::Terminator;
use crate::session::event::is_turn_completed;
use crate::stream::codec::Frame;
use crate::stream::queue::LineSender;
use crate::Result;

/// Grace interval between seeing the sentinel and signalling the child.
pub const SENTINEL_GRACE: Duration = Duration::from_millis(300);

/// Why the reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The output stream reached end-of-file.
    Eof,
    /// The turn-completion sentinel was seen.
    Sentinel,
    /// The underlying stream failed.
    ReadError,
    /// The supervisor cancelled the reader.
    Cancelled,
    /// The consumer dropped its end of the queue.
    ConsumerGone,
}

/// Spawn [`run_reader`] on the tokio runtime.
#[must_use]
pub fn spawn_reader<S>(
    lines: S,
    queue: LineSender,
    terminator: Terminator,
    sentinel_grace: Duration,
    cancel: CancellationToken,
) -> JoinHandle<ReaderExit>
where
    S: Stream<Item = Result<Frame>> + Unpin + Send + 'static,
{
    tokio::spawn(run_reader(lines, queue, terminator, sentinel_grace, cancel))
}

/// Read `lines` until end-of-stream, sentinel, or cancellation.
pub async fn run_reader<S>(
    mut lines: S,
    queue: LineSender,
    terminator: Terminator,
    sentinel_grace: Duration,
    cancel: CancellationToken,
) -> ReaderExit
where
    S: Stream<Item = Result<Frame>> + Unpin + Send,
{
    let mut forwarded: u64 = 0;

    let exit = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(forwarded, "reader: cancellation received, stopping");
                break ReaderExit::Cancelled;
            }

            item = lines.next() => {
                match item {
                    None => {
                        debug!(forwarded, "reader: EOF detected");
                        break ReaderExit::Eof;
                    }

                    Some(Err(err)) => {
                        warn!(forwarded, error = %err, "reader: stream error, stopping");
                        break ReaderExit::ReadError;
                    }

                    Some(Ok(Frame::Oversized { limit })) => {
                        warn!(forwarded, limit, "reader: discarded line exceeding the length limit");
                        if !queue.push_oversized(limit) {
                            debug!(forwarded, "reader: queue closed, stopping");
                            break ReaderExit::ConsumerGone;
                        }
                        forwarded += 1;
                    }

                    Some(Ok(Frame::Line(raw))) => {
                        let line = raw.trim_end().to_owned();
                        let sentinel = is_turn_completed(&line);

                        if !queue.push(line) {
                            debug!(forwarded, "reader: queue closed, stopping");
                            break ReaderExit::ConsumerGone;
                        }
                        forwarded += 1;

                        if sentinel {
                            info!(forwarded, "reader: turn completed, requesting shutdown");
                            tokio::time::sleep(sentinel_grace).await;
                            terminator.request_graceful();
                            break ReaderExit::Sentinel;
                        }
                    }
                }
            }
        }
    };

    queue.finish();
    exit
}
