//! Session semantics: decoding wire events, folding them into a result,
//! and assembling the final report.

pub mod classifier;
pub mod event;
pub mod report;

pub use classifier::{
    ClassifierOptions, Diagnostic, EventClassifier, SessionResult, SuccessFlag,
    PARTIAL_PREVIEW_CHARS,
};
pub use event::{
    classify, decode_line, is_turn_completed, timeout_event, Decoded, DecodedEvent, Event,
    ItemEvent, RECONNECT_PATTERN, TURN_COMPLETED,
};
pub use report::{aggregate, RunReport, DIAGNOSTIC_SEPARATOR};
