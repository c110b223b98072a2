//! The error type shared by the driver and transport crates.
//!
//! [`ProtocolError`](oculus_proto::ProtocolError) covers malformed bytes;
//! this covers everything above the codec: I/O, timing, and the policy
//! faults the driver itself can raise.

use std::io;

use oculus_proto::ProtocolError;
use thiserror::Error;

/// Errors raised anywhere above the wire codec.
#[derive(Debug, Error)]
pub enum OculusError {
    /// The underlying socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A malformed header or payload was read off the wire.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The byte stream lost frame synchronization and had to resync past
    /// more than the configured budget without finding a valid header.
    #[error("lost frame sync after discarding {discarded} bytes (budget {budget})")]
    ProtocolDesync {
        /// Bytes discarded while searching for the next valid header.
        discarded: usize,
        /// Configured resync budget.
        budget: usize,
    },

    /// A fire command was sent but firmware never acknowledged it within
    /// the retry budget; the sonar may or may not be pinging at the
    /// requested configuration.
    #[error("configuration request was never acknowledged after {attempts} attempts")]
    ConfigUnverified {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A blocking wait (for a connection, a config ack, or a callback) did
    /// not complete before its deadline.
    #[error("timed out waiting for {waited_for}")]
    TimeoutReached {
        /// What the caller was waiting for, for diagnostics.
        waited_for: &'static str,
    },

    /// A log file's header or an item header failed validation.
    #[error("log file format invalid: {0}")]
    LogFormatInvalid(&'static str),

    /// A parsed ping's declared geometry is inconsistent with its actual
    /// payload length (the kind of corruption a truncated recording or a
    /// torn read can produce).
    #[error("ping payload inconsistent: {0}")]
    PingPayloadInconsistent(&'static str),
}

impl OculusError {
    /// `true` if retrying the same operation again is reasonable: a
    /// dropped connection, a desynced stream, or a timed-out wait are all
    /// conditions that can resolve themselves. A malformed log file or an
    /// internally inconsistent ping payload will not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ProtocolDesync { .. } | Self::TimeoutReached { .. } | Self::ConfigUnverified { .. }
        )
    }
}

/// Result alias used throughout the driver and transport crates.
pub type Result<T> = core::result::Result<T, OculusError>;
