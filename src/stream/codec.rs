//! NDJSON line codec for child output streams.
//!
//! Wraps [`tokio_util::codec::AnyDelimiterCodec`] with a configurable maximum
//! line length so a misbehaving child cannot make the bridge allocate
//! unbounded memory for a single line.
//!
//! Unlike a plain `LinesCodec`, this codec never fails on content:
//!
//! - bytes that are not valid UTF-8 are decoded lossily, so a line is never
//!   dropped for encoding reasons;
//! - an over-long line yields [`Frame::Oversized`] instead of an error, which
//!   keeps [`FramedRead`](tokio_util::codec::FramedRead) reading afterwards
//!   and lets the consumer record the loss.
//!
//! Only genuine I/O failures surface, as [`AppError::Stream`].

use bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

use crate::{AppError, Result};

/// Default maximum line length accepted by the codec: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded unit of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its terminating `\n`.
    Line(String),
    /// A line exceeded the configured limit and was discarded.
    Oversized {
        /// The limit in effect, in bytes.
        limit: usize,
    },
}

/// Newline-delimited codec for child stdout/stderr.
#[derive(Debug)]
pub struct LineCodec {
    inner: AnyDelimiterCodec,
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec that rejects lines longer than `max_length` bytes.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_length,
            ),
            max_length,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        map_chunk(self.inner.decode(src), self.max_length)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        map_chunk(self.inner.decode_eof(src), self.max_length)
    }
}

fn map_chunk(
    chunk: std::result::Result<Option<bytes::Bytes>, AnyDelimiterCodecError>,
    limit: usize,
) -> Result<Option<Frame>> {
    match chunk {
        Ok(Some(bytes)) => Ok(Some(Frame::Line(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))),
        Ok(None) => Ok(None),
        Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Oversized { limit })),
        Err(AnyDelimiterCodecError::Io(err)) => Err(AppError::Stream(format!("read failed: {err}"))),
    }
}
