//! Inputs the [`crate::Client`] state machine reacts to, and the actions it
//! asks its I/O driver to take in response.

use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;
use oculus_proto::{Message, StatusMsg};

/// Something the I/O layer observed and is handing to the state machine.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A status broadcast named a sonar at this address; connect to it.
    StatusObserved(StatusMsg),
    /// The TCP connect attempt the state machine asked for has succeeded.
    ConnectCompleted,
    /// The TCP connect attempt failed, or the open socket errored.
    ConnectFailed,
    /// The socket was closed, locally or by the peer.
    Disconnected,
    /// Raw bytes arrived on the socket.
    BytesReceived(Bytes),
    /// The periodic liveness check fired; `silent_for` is how long it has
    /// been since the last message was framed.
    LivenessCheck {
        /// Time elapsed since the last successfully framed message.
        silent_for: Duration,
    },
}

/// Something the state machine wants its I/O driver to do.
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// Open a TCP connection to this address on the sonar port.
    Connect(Ipv4Addr),
    /// Write these bytes to the open socket.
    Send(Bytes),
    /// Close the socket and forget the current connection.
    CloseConnection,
    /// A complete message was framed; hand it to message subscribers.
    Deliver(Message),
    /// The stream desynced and bytes were discarded while resyncing.
    /// Informational only; the client keeps reading.
    DiscardedBytes {
        /// Number of bytes dropped before a valid header was found again.
        count: usize,
    },
    /// The silent period exceeded the liveness budget; reset the
    /// connection and try again.
    ResetForSilence,
}
