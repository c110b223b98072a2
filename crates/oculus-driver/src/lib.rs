//! Sans-IO connection state machine and ping configuration policy for the
//! Oculus driver.
//!
//! # Architecture
//!
//! [`Client`] is pure state: it turns raw bytes and connection events into
//! framed [`oculus_proto::Message`]s and tells its caller what to do next,
//! without ever touching a socket. [`Driver`] wraps a `Client` with the
//! policy a real caller wants on top: the firmware's broken `ping_rate`
//! echo and `master_mode == 2` gain remap, and five independent callback
//! registries instead of one undifferentiated message stream. Driving an
//! actual socket from these events lives in `oculus-net`.
//!
//! # Modules
//!
//! - [`state`]: the connection lifecycle enum.
//! - [`event`]: inputs to and outputs from the state machine.
//! - [`client`]: the sans-IO framing state machine.
//! - [`driver`]: ping configuration policy and callback fan-out.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// The sans-IO framing state machine.
pub mod client;
/// Ping configuration policy and callback fan-out.
pub mod driver;
/// Inputs to and outputs from the state machine.
pub mod event;
/// The connection lifecycle enum.
pub mod state;

pub use client::Client;
pub use driver::Driver;
pub use event::{ClientAction, ClientEvent};
pub use state::ConnectionState;
