//! Ties the status listener and the transport together into the one
//! background task a caller actually starts: watch for a sonar, connect to
//! it, reconnect with backoff if it drops, and watch for a silent
//! connection in the meantime.

use std::{
    net::Ipv4Addr,
    path::Path,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use oculus_core::{OculusError, Result};
use oculus_driver::Driver;
use oculus_proto::Message;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{recorder::Recorder, status_listener::StatusListener, transport::Transport};

/// How often the reactor checks whether the connection has gone silent.
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the status listener and the transport's connect/reconnect loop as
/// one managed background task, and owns the optional log recorder: when
/// open, every message the driver frames is written to it inline, on
/// whatever thread the transport is running on.
pub struct Reactor {
    transport: Arc<Transport>,
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    recorder: Arc<StdMutex<Option<Recorder>>>,
}

impl Reactor {
    /// Builds a reactor around `driver`, but does not start anything yet;
    /// call [`Self::start`]. Registers the log recorder as a message
    /// subscriber immediately, so recording can be turned on and off with
    /// [`Self::recorder_open`]/[`Self::recorder_close`] at any point in the
    /// reactor's lifetime.
    #[must_use]
    pub fn new(driver: Arc<Driver>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let transport = Arc::new(Transport::new(driver));
        let recorder: Arc<StdMutex<Option<Recorder>>> = Arc::new(StdMutex::new(None));

        let recorder_for_callback = Arc::clone(&recorder);
        transport.driver().message_callbacks().add(move |message: &Message| {
            let mut guard = recorder_for_callback.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(recorder) = guard.as_mut() {
                if let Err(err) = recorder.write_message(message) {
                    warn!(%err, "failed to write message to log file");
                }
            }
        });

        Self { transport, stop_tx, tasks: Mutex::new(Vec::new()), recorder }
    }

    /// The transport this reactor drives, for sending fire commands once
    /// connected.
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Opens a log file at `path` and starts recording every framed
    /// message to it inline. Fails if `path` already exists and
    /// `overwrite` is `false`.
    pub fn recorder_open(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        if !overwrite && path.exists() {
            return Err(OculusError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "log file already exists",
            )));
        }
        let recorder = Recorder::create(path).map_err(OculusError::Io)?;
        *self.recorder.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(recorder);
        Ok(())
    }

    /// Stops recording and closes the current log file, if any.
    pub fn recorder_close(&self) {
        *self.recorder.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// `true` iff a log file is currently open.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recorder.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_some()
    }

    /// Starts the status listener, the connect/reconnect loop, and the
    /// liveness checker as background tasks. Connects automatically to the
    /// first sonar whose status broadcast is observed.
    pub async fn start(&self) -> Result<()> {
        let listener = Arc::new(StatusListener::bind().await?);
        let mut tasks = self.tasks.lock().await;

        let listener_task = listener.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                result = listener_task.run() => {
                    if let Err(err) = result {
                        warn!(%err, "status listener exited");
                    }
                }
                _ = stop_rx.changed() => {}
            }
        }));

        let (addr_tx, addr_rx) = watch::channel(None::<Ipv4Addr>);
        listener.registry().add(move |status: &oculus_proto::StatusMsg| {
            let _ = addr_tx.send(Some(status.ip_addr()));
        });

        let transport = Arc::clone(&self.transport);
        let mut stop_rx = self.stop_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            Self::connect_loop(transport, addr_rx, &mut stop_rx).await;
        }));

        let transport_for_liveness = Arc::clone(&self.transport);
        let mut stop_rx = self.stop_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            Self::liveness_loop(transport_for_liveness, &mut stop_rx).await;
        }));

        Ok(())
    }

    async fn connect_loop(
        transport: Arc<Transport>,
        mut addr_rx: watch::Receiver<Option<Ipv4Addr>>,
        stop_rx: &mut watch::Receiver<bool>,
    ) {
        let mut attempt = 0u32;
        loop {
            tokio::select! {
                changed = addr_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = stop_rx.changed() => return,
            }
            let Some(addr) = *addr_rx.borrow() else { continue };
            loop {
                match transport.run_once(addr).await {
                    Ok(()) => {
                        info!(%addr, "sonar connection closed cleanly");
                        attempt = 0;
                    }
                    Err(err) => {
                        warn!(%addr, %err, attempt, "sonar connection attempt failed");
                        attempt += 1;
                    }
                }
                tokio::select! {
                    () = tokio::time::sleep(Transport::backoff_delay(attempt)) => {}
                    _ = stop_rx.changed() => return,
                }
                if addr_rx.has_changed().unwrap_or(false) {
                    break;
                }
            }
        }
    }

    async fn liveness_loop(transport: Arc<Transport>, stop_rx: &mut watch::Receiver<bool>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(LIVENESS_POLL_INTERVAL) => {}
                _ = stop_rx.changed() => return,
            }
            if let Err(err) = transport.check_liveness().await {
                warn!(%err, "liveness check failed");
            }
        }
    }

    /// Signals every background task to stop and waits for them to exit.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use bytes::Bytes;
    use oculus_proto::{ids, Header};

    use super::*;

    #[test]
    fn fresh_reactor_is_not_recording() {
        let reactor = Reactor::new(Arc::new(Driver::new(1)));
        assert!(!reactor.is_recording());
    }

    #[test]
    fn recorder_open_then_close_tracks_is_recording() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");
        let reactor = Reactor::new(Arc::new(Driver::new(1)));

        reactor.recorder_open(&path, false).expect("open");
        assert!(reactor.is_recording());

        reactor.recorder_close();
        assert!(!reactor.is_recording());
    }

    #[test]
    fn recorder_open_refuses_to_clobber_an_existing_file_without_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");
        std::fs::write(&path, b"not a log file").expect("write");
        let reactor = Reactor::new(Arc::new(Driver::new(1)));

        let result = reactor.recorder_open(&path, false);
        assert!(result.is_err());
        assert!(!reactor.is_recording());

        reactor.recorder_open(&path, true).expect("overwrite");
        assert!(reactor.is_recording());
    }

    #[test]
    fn messages_framed_while_recording_are_written_inline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");
        let driver = Arc::new(Driver::new(1));
        let reactor = Reactor::new(Arc::clone(&driver));
        reactor.recorder_open(&path, false).expect("open");

        let header = Header::new(ids::DUMMY, 1, 0, 1, 4);
        driver.message_callbacks().call(&Message::parse_message(header, Bytes::from_static(&[1, 2, 3, 4])));
        reactor.recorder_close();

        let mut reader = crate::file_reader::FileReader::open(&path).expect("open for reading");
        let read_back = reader.read_next_message().expect("read").expect("some message");
        assert_eq!(read_back.message_id(), ids::DUMMY);
        assert_eq!(read_back.data().as_ref(), &[1, 2, 3, 4]);
    }
}
