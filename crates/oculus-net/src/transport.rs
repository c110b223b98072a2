//! Drives the sans-IO [`Driver`] over an actual TCP socket: reads bytes off
//! the wire, feeds them through the state machine, and carries out
//! whatever actions come back. Also the only place callers can actually
//! send a fire command, since that requires a live write half.

use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex as StdMutex},
    time::{Duration, Instant},
};

use oculus_core::{OculusError, Result};
use oculus_driver::{ClientAction, ClientEvent, Driver};
use oculus_proto::PingConfig;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::{mpsc, Mutex, Notify},
};
use tracing::{info, warn};

/// TCP port the sonar's control and data connection listens on.
pub const SONAR_PORT: u16 = 52100;

/// Read buffer size for one socket read; message framing happens in
/// [`Driver`], so this only bounds how many bytes accumulate per syscall.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Owns the TCP connection to one sonar and pumps bytes through its
/// [`Driver`] until the connection closes or is reset.
pub struct Transport {
    driver: Arc<Driver>,
    write_half: Mutex<Option<OwnedWriteHalf>>,
    reset: Notify,
    last_activity: StdMutex<Option<Instant>>,
}

impl Transport {
    /// Wraps a driver with the machinery to actually connect it to a
    /// socket. Starts with no live connection.
    #[must_use]
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver, write_half: Mutex::new(None), reset: Notify::new(), last_activity: StdMutex::new(None) }
    }

    /// The driver this transport drives.
    #[must_use]
    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Connects to `addr` on [`SONAR_PORT`], sends the last requested ping
    /// configuration, then runs the read loop until the connection ends.
    /// Returns once the connection is closed; callers that want automatic
    /// reconnection should call this again after [`Self::backoff_delay`].
    pub async fn run_once(&self, addr: Ipv4Addr) -> Result<()> {
        let stream = match TcpStream::connect((addr, SONAR_PORT)).await {
            Ok(stream) => stream,
            Err(err) => {
                self.driver.handle(ClientEvent::ConnectFailed);
                return Err(OculusError::Io(err));
            }
        };
        stream.set_nodelay(true).map_err(OculusError::Io)?;
        info!(%addr, "connected to sonar");

        self.driver.handle(ClientEvent::ConnectCompleted);
        let (read_half, write_half) = stream.into_split();
        *self.write_half.lock().await = Some(write_half);
        *self.last_activity.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());

        self.carry_out(self.driver.on_connect()).await?;
        let result = self.read_loop(read_half).await;
        *self.write_half.lock().await = None;
        *self.last_activity.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        result
    }

    async fn read_loop(&self, mut read_half: tokio::net::tcp::OwnedReadHalf) -> Result<()> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = tokio::select! {
                result = read_half.read(&mut buf) => result.map_err(OculusError::Io)?,
                () = self.reset.notified() => {
                    self.driver.handle(ClientEvent::Disconnected);
                    return Ok(());
                }
            };
            if n == 0 {
                self.driver.handle(ClientEvent::Disconnected);
                return Ok(());
            }
            *self.last_activity.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
            let actions = self.driver.handle(ClientEvent::BytesReceived(bytes::Bytes::copy_from_slice(&buf[..n])));
            for action in actions {
                if matches!(action, ClientAction::CloseConnection) {
                    return Ok(());
                }
                self.carry_out(action).await?;
            }
        }
    }

    async fn carry_out(&self, action: ClientAction) -> Result<()> {
        match action {
            ClientAction::Send(bytes) => {
                let mut guard = self.write_half.lock().await;
                match guard.as_mut() {
                    Some(write_half) => write_half.write_all(&bytes).await.map_err(OculusError::Io),
                    None => Err(OculusError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "no open connection to send on",
                    ))),
                }
            }
            ClientAction::CloseConnection => {
                *self.write_half.lock().await = None;
                Ok(())
            }
            ClientAction::DiscardedBytes { count } => {
                warn!(count, "discarded bytes while resyncing sonar stream");
                Ok(())
            }
            ClientAction::ResetForSilence => {
                warn!("sonar connection silent past liveness limit");
                self.reset.notify_one();
                Ok(())
            }
            ClientAction::Connect(_) | ClientAction::Deliver(_) => Ok(()),
        }
    }

    /// `true` iff a socket is currently open.
    pub async fn is_connected(&self) -> bool {
        self.write_half.lock().await.is_some()
    }

    /// Sends a fire command on the current connection, if any.
    pub async fn send_ping_config(&self, config: PingConfig) -> Result<()> {
        self.carry_out(self.driver.send_ping_config(config)).await
    }

    /// Stops pinging without dropping the connection.
    pub async fn standby(&self) -> Result<()> {
        self.carry_out(self.driver.standby()).await
    }

    /// Resumes pinging at the last non-standby rate requested.
    pub async fn resume(&self) -> Result<()> {
        self.carry_out(self.driver.resume()).await
    }

    /// Requests `req` and blocks (on a dedicated blocking thread, not this
    /// task) until firmware acknowledges it or the retry budget is
    /// exhausted.
    ///
    /// [`Driver::request_ping_config`] is sans-IO and has no socket of its
    /// own, so it drives this transport's actual sends through `dispatch`,
    /// a channel bridging its blocking thread back to this task, which is
    /// the only place allowed to touch the write half.
    pub async fn request_ping_config(&self, req: PingConfig, timeout: Duration) -> Result<PingConfig> {
        let driver = Arc::clone(&self.driver);
        let (action_tx, mut action_rx) = mpsc::unbounded_channel::<ClientAction>();
        let blocking = tokio::task::spawn_blocking(move || {
            driver.request_ping_config(req, timeout, move |action| {
                let _ = action_tx.send(action);
            })
        });

        while let Some(action) = action_rx.recv().await {
            self.carry_out(action).await?;
        }

        blocking.await.map_err(|err| OculusError::Io(std::io::Error::other(err)))?
    }

    /// Measures how long it's been since any bytes were last received on
    /// the current connection, feeds that through the driver as a liveness
    /// tick, and carries out whatever it returns. A no-op while there is no
    /// open connection.
    pub async fn check_liveness(&self) -> Result<()> {
        let silent_for = {
            let guard = self.last_activity.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match *guard {
                Some(last) => last.elapsed(),
                None => return Ok(()),
            }
        };
        for action in self.driver.handle(ClientEvent::LivenessCheck { silent_for }) {
            self.carry_out(action).await?;
        }
        Ok(())
    }

    /// How long to wait before the `attempt`-th reconnect (0-indexed),
    /// bounded exponential backoff from 100ms up to 2s.
    #[must_use]
    pub fn backoff_delay(attempt: u32) -> Duration {
        let capped_attempt = attempt.min(5);
        let delay = Duration::from_millis(100 * 2u64.pow(capped_attempt));
        delay.min(Duration::from_secs(2))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use oculus_driver::Driver;
    use oculus_proto::config;

    use super::*;

    #[test]
    fn backoff_delay_doubles_then_caps() {
        assert_eq!(Transport::backoff_delay(0), Duration::from_millis(100));
        assert_eq!(Transport::backoff_delay(1), Duration::from_millis(200));
        assert_eq!(Transport::backoff_delay(4), Duration::from_millis(1600));
        assert_eq!(Transport::backoff_delay(5), Duration::from_secs(2));
        assert_eq!(Transport::backoff_delay(50), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn fresh_transport_is_not_connected() {
        let driver = Arc::new(Driver::new(1));
        let transport = Transport::new(driver);
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn sending_with_no_connection_fails() {
        let driver = Arc::new(Driver::new(1));
        let transport = Transport::new(driver);
        let result = transport.send_ping_config(config::default_ping_config()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn liveness_check_is_noop_without_connection() {
        let driver = Arc::new(Driver::new(1));
        let transport = Transport::new(driver);
        transport.check_liveness().await.expect("no-op should not error");
    }

    #[tokio::test]
    async fn request_ping_config_with_no_connection_fails() {
        let driver = Arc::new(Driver::new(1));
        let transport = Transport::new(driver);
        let result = transport.request_ping_config(config::default_ping_config(), Duration::from_millis(1)).await;
        assert!(result.is_err());
    }
}
