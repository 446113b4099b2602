//! Protocol-level error taxonomy.

use thiserror::Error;

/// Errors raised while encoding or decoding wire structures.
///
/// These are all "malformed input" errors (§7 `DatagramMalformed`); callers
/// at the ingestion boundary log and drop rather than propagate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes remain in the buffer than the structure requires.
    #[error("insufficient buffer: need {needed} bytes, have {available}")]
    InsufficientBuffer {
        /// Bytes required to decode or encode the structure.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// `payload_length` declared in the envelope exceeds `MAX_PAYLOAD_LEN`.
    #[error("payload of {0} bytes exceeds MAX_PAYLOAD_LEN")]
    PayloadTooLarge(usize),

    /// The envelope's `command` field does not name a known command.
    #[error("unknown command code {0}")]
    UnknownCommand(u16),
}
