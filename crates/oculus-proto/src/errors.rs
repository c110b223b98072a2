//! Protocol-level error types.
//!
//! These are the faults the codec itself can raise: structural issues with a
//! header or a ping payload. Faults that require I/O context (reconnection,
//! timeouts) live in `oculus-core`.

use thiserror::Error;

/// Errors raised while framing or parsing wire messages.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer shorter than `Header::SIZE`.
    #[error("header buffer too short: got {got} bytes, need {need}")]
    HeaderTooShort {
        /// Bytes actually available.
        got: usize,
        /// Bytes required.
        need: usize,
    },

    /// `magic` field did not match `OCULUS_MAGIC`.
    #[error("invalid header magic: {0:#06x}")]
    InvalidMagic(u16),

    /// `payload_size` exceeded the implausible-size guard.
    #[error("payload size {size} exceeds the implausible-size guard of {max}")]
    PayloadTooLarge {
        /// Claimed payload size.
        size: u32,
        /// Guard threshold.
        max: u32,
    },
}

/// Result alias for codec operations.
pub type Result<T> = core::result::Result<T, ProtocolError>;
