//! Broadcasts a one-line JSON notice for every message received, so other
//! processes on the same host (loggers, timestamping bridges) can observe
//! traffic without subscribing to the driver directly.

use std::net::Ipv4Addr;

use oculus_core::{OculusError, Result};
use oculus_proto::Message;
use tokio::net::UdpSocket;
use tracing::warn;

/// Broadcasts on UDP with `SO_BROADCAST` set, one datagram per message.
///
/// Best-effort: a send failure is logged and otherwise ignored, since a
/// missing broadcast subscriber should never affect the driver itself.
pub struct StampBroadcaster {
    socket: UdpSocket,
    broadcast_addr: (Ipv4Addr, u16),
}

impl StampBroadcaster {
    /// Opens a broadcast-capable UDP socket and targets it at the subnet
    /// broadcast address on `port`.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(OculusError::Io)?;
        socket.set_broadcast(true).map_err(OculusError::Io)?;
        Ok(Self { socket, broadcast_addr: (Ipv4Addr::BROADCAST, port) })
    }

    /// Broadcasts `{"oculusId": ..., "deviceId": ..., "timestampMicros": ...}`
    /// for `message`. Errors are logged, not propagated.
    pub async fn send(&self, message: &Message) {
        let micros = message
            .timestamp()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let payload = format!(
            "{{\"oculusId\": {}, \"deviceId\": {}, \"timestampMicros\": {}}}",
            message.header().msg_id(),
            message.header().src_id(),
            micros
        );
        if let Err(err) = self.socket.send_to(payload.as_bytes(), self.broadcast_addr).await {
            warn!(%err, "failed to broadcast message stamp");
        }
    }
}
