//! Connection lifecycle state.

/// Where a [`crate::Client`] is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt has been made yet.
    Initializing,
    /// A TCP connect is in flight.
    Attempting,
    /// The socket is open and framing bytes successfully.
    Connected,
    /// A previously open connection dropped or desynced past its resync
    /// budget; a fresh attempt has not started yet.
    Lost,
}

impl ConnectionState {
    /// `true` iff messages can currently be sent and received.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}
