//! Error taxonomy shared by every fallible operation in the crate.

use thiserror::Error;

/// Errors produced while compiling effects, linking a pipeline, building a
/// transfer batch, or decoding a command stream.
///
/// The pipeline evaluator (runtime, per-sample) never returns one of these:
/// unknown opcodes execute as NOP so audio keeps flowing, and a diagnostic is
/// logged instead. See [`crate::pipeline::PipelineState::step`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required operand or binding was absent.
    #[error("null reference: {what}")]
    NullRef {
        /// What was missing, for diagnostics.
        what: &'static str,
    },

    /// An index or argument fell outside its legal range.
    #[error("bad argument: {0}")]
    BadArgs(String),

    /// A buffer could not grow to hold the requested data.
    #[error("allocation failure")]
    AllocFail,

    /// A derived-quantity expression string failed to parse.
    #[error("expression parse error: {0}")]
    ExprParse(String),

    /// An encoded instruction word carried an opcode that does not exist.
    #[error("unknown opcode 0x{0:02x} in encoded instruction")]
    BadInstruction(u8),

    /// A byte in the command stream did not match any known command.
    #[error("unknown command byte 0x{0:02x}")]
    UnknownCommand(u8),

    /// The transport is applying backpressure; retry the push later.
    #[error("transport would block")]
    WouldBlock,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
