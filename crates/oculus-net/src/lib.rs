//! Async I/O for the Oculus driver: the actual sockets, background tasks,
//! and on-disk log format that [`oculus_driver`]'s sans-IO state machine
//! doesn't know about.
//!
//! # Architecture
//!
//! - [`status_listener`]: the UDP broadcast that announces a sonar's
//!   presence and address.
//! - [`transport`]: the TCP connection that actually carries ping traffic,
//!   driving [`oculus_driver::Driver`] with the bytes it reads.
//! - [`reactor`]: wires the listener and transport together into the one
//!   background task most callers actually want, with reconnect-on-drop
//!   and liveness monitoring.
//! - [`recorder`] / [`file_reader`]: writing and reading back the on-disk
//!   log format.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Reads messages back out of a log file written by [`Recorder`].
pub mod file_reader;
/// Ties the status listener and transport together into one managed task.
pub mod reactor;
/// Writes sonar traffic to an on-disk log file.
pub mod recorder;
/// Broadcasts a one-line JSON notice for every message received.
pub mod stamp_broadcaster;
/// Listens for the sonar's periodic UDP status broadcast.
pub mod status_listener;
/// Drives the sans-IO driver over an actual TCP socket.
pub mod transport;

pub use file_reader::FileReader;
pub use reactor::Reactor;
pub use recorder::Recorder;
pub use stamp_broadcaster::StampBroadcaster;
pub use status_listener::StatusListener;
pub use transport::{Transport, SONAR_PORT};
