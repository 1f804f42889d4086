//! Child output stream handling.
//!
//! - `codec`: newline framing with a per-line size limit.
//! - `queue`: the ordered hand-off between reader and supervisor.
//! - `reader`: the background task that fills the queue and spots the
//!   turn-completion sentinel.

pub mod codec;
pub mod queue;
pub mod reader;

pub use codec::{Frame, LineCodec, MAX_LINE_BYTES};
pub use queue::{line_queue, LineReceiver, LineSender, Polled};
pub use reader::{run_reader, spawn_reader, ReaderExit, SENTINEL_GRACE};
