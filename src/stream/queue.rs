//! Single-producer, single-consumer line queue.
//!
//! The stream reader pushes lines (and markers for discarded over-long
//! lines) in the order they were read and finishes the queue with an end
//! marker (`None`) exactly once. [`LineSender::finish`] consumes the sender,
//! so a second marker cannot be enqueued.
//!
//! The supervisor side polls with a bounded wait so it can re-check its
//! deadline at least once per poll interval.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::stream::codec::Frame;

/// Create a connected sender/receiver pair.
#[must_use]
pub fn line_queue() -> (LineSender, LineReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LineSender { tx }, LineReceiver { rx })
}

/// Producer half, owned by the stream reader.
#[derive(Debug)]
pub struct LineSender {
    tx: mpsc::UnboundedSender<Option<Frame>>,
}

impl LineSender {
    /// Enqueue one line.
    ///
    /// Returns `false` when the consumer has gone away.
    pub fn push(&self, line: String) -> bool {
        self.tx.send(Some(Frame::Line(line))).is_ok()
    }

    /// Enqueue a marker for a line longer than `limit` bytes.
    ///
    /// Returns `false` when the consumer has gone away.
    pub fn push_oversized(&self, limit: usize) -> bool {
        self.tx.send(Some(Frame::Oversized { limit })).is_ok()
    }

    /// Enqueue the end marker. No further lines can follow it.
    pub fn finish(self) {
        let _ = self.tx.send(None);
    }
}

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// A line arrived within the wait window.
    Line(String),
    /// A line over `limit` bytes was read and discarded.
    Oversized {
        /// The limit in effect, in bytes.
        limit: usize,
    },
    /// The reader finished; nothing more will arrive.
    Finished,
    /// Nothing arrived within the wait window.
    Empty,
}

/// Consumer half, owned by the supervisor.
#[derive(Debug)]
pub struct LineReceiver {
    rx: mpsc::UnboundedReceiver<Option<Frame>>,
}

impl LineReceiver {
    /// Wait up to `wait` for the next item.
    ///
    /// A channel closed without an end marker means the reader died (it was
    /// aborted or panicked). That is reported as [`Polled::Empty`] once the
    /// wait has passed, leaving the stop decision to the idle check.
    pub async fn poll(&mut self, wait: Duration) -> Polled {
        let Ok(item) = tokio::time::timeout(wait, self.rx.recv()).await else {
            return Polled::Empty;
        };
        match item {
            Some(Some(Frame::Line(line))) => Polled::Line(line),
            Some(Some(Frame::Oversized { limit })) => Polled::Oversized { limit },
            Some(None) => Polled::Finished,
            None => {
                tokio::time::sleep(wait).await;
                Polled::Empty
            }
        }
    }

    /// Take every item that is already buffered without waiting.
    ///
    /// End markers are skipped; items keep their enqueue order.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let Some(frame) = item {
                frames.push(frame);
            }
        }
        frames
    }
}
