//! Listens for the sonar's periodic UDP status broadcast.

use std::sync::Arc;

use oculus_core::{CallbackRegistry, OculusError, Result};
use oculus_proto::status::{StatusMsg, MIN_STATUS_SIZE, STATUS_PORT};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Generous upper bound on a status datagram; the vendor's real status
/// payload is out of scope here, so this just needs to comfortably fit it.
const RECV_BUFFER_SIZE: usize = 1500;

/// Owns the UDP socket sonars broadcast their status to, and fans out
/// every well-formed status message it observes.
pub struct StatusListener {
    socket: UdpSocket,
    registry: Arc<CallbackRegistry<StatusMsg>>,
}

impl StatusListener {
    /// Binds `0.0.0.0:52102`, the port every Oculus device broadcasts its
    /// status message to.
    pub async fn bind() -> Result<Self> {
        Self::bind_to(("0.0.0.0", STATUS_PORT)).await
    }

    /// Binds to an explicit address; tests use an ephemeral port since
    /// binding [`oculus_proto::status::STATUS_PORT`] requires a single
    /// owner per host.
    pub async fn bind_to(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(OculusError::Io)?;
        socket.set_broadcast(true).map_err(OculusError::Io)?;
        Ok(Self { socket, registry: Arc::new(CallbackRegistry::new()) })
    }

    /// The registry subscribers attach to via `.add()`/`.add_single_shot()`.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry<StatusMsg>> {
        &self.registry
    }

    /// Runs the receive loop until the socket errors. Datagrams too short
    /// or with a bad header are logged and dropped; they don't end the
    /// loop, since a stray broadcast from an unrelated device is expected
    /// network noise, not a reason to stop listening for the real one.
    pub async fn run(&self) -> Result<()> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (n, _peer) = self.socket.recv_from(&mut buf).await.map_err(OculusError::Io)?;
            if n < MIN_STATUS_SIZE {
                trace!(bytes = n, "status datagram too short, dropping");
                continue;
            }
            match StatusMsg::parse(&buf[..n]) {
                Some(status) => {
                    debug!(ip = %status.ip_addr(), "sonar status observed");
                    self.registry.call(&status);
                }
                None => trace!("status datagram failed header validation, dropping"),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn well_formed_status_datagram_reaches_subscribers() {
        let listener = StatusListener::bind_to(("127.0.0.1", 0)).await.expect("bind");
        let local_addr = listener.socket.local_addr().expect("local addr");

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        listener.registry().add_single_shot(move |status: &StatusMsg| {
            *seen_clone.lock().unwrap() = Some(status.device_id());
        });

        let sender = UdpSocket::bind(("127.0.0.1", 0)).await.expect("bind sender");
        let header = oculus_proto::Header::new(0, 0, 0, 0, 0).to_bytes();
        let mut datagram = header.to_vec();
        datagram.extend_from_slice(&9u32.to_le_bytes());
        datagram.extend_from_slice(&[127, 0, 0, 1]);
        datagram.extend_from_slice(&0u32.to_le_bytes());
        sender.send_to(&datagram, local_addr).await.expect("send");

        let run = tokio::time::timeout(std::time::Duration::from_millis(200), listener.run());
        let _ = run.await;

        assert_eq!(*seen.lock().unwrap(), Some(9));
    }
}
