//! Wire codec and data model for the Oculus sonar protocol.
//!
//! # Architecture
//!
//! This crate is pure data: parsing, framing, and the handful of pure
//! functions ([`config_equivalent`], [`config_changed`], [`PingView`]'s
//! gain-inference rules) that read as policy but have no I/O or clock of
//! their own. Nothing here blocks, sleeps, or owns a socket; that belongs
//! to `oculus-net`. Nothing here decides what to do about a connection
//! drop; that belongs to `oculus-driver`.
//!
//! # Modules
//!
//! - [`header`]: the 16-byte framing header shared by every message.
//! - [`message`]: a header bound to its payload bytes.
//! - [`config`]: the fire command and its acknowledgment rules.
//! - [`ping`]: ping result metadata, v1/v2 dispatch, gain inference.
//! - [`status`]: the UDP status broadcast.
//! - [`log`]: on-disk log file and item headers.
//! - [`ids`]: message type identifiers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// The fire command and its acknowledgment rules.
pub mod config;
/// Protocol-level error types.
pub mod errors;
/// The 16-byte framing header shared by every message.
pub mod header;
/// Message type identifiers.
pub mod ids;
/// On-disk log file and item headers.
pub mod log;
/// A header bound to its payload bytes.
pub mod message;
/// Ping result metadata, v1/v2 dispatch, gain inference.
pub mod ping;
/// The UDP status broadcast.
pub mod status;

pub use config::{config_changed, config_equivalent, default_ping_config, PingConfig};
pub use errors::{ProtocolError, Result};
pub use header::{validate_header, Header, MAX_PAYLOAD_SIZE, OCULUS_MAGIC};
pub use log::{LogFileHeader, LogItem, SonarStamp};
pub use message::Message;
pub use ping::{rescale_reported_gain, PingMetadataV1, PingMetadataV2, PingView};
pub use status::StatusMsg;
