//! Message type identifiers routed by the codec.
//!
//! Names are illustrative (bound to the vendor's real constants in a
//! production build); the values themselves are what the firmware actually
//! sends.

/// Fire command: instructs the sonar to start or continue pinging with a
/// given configuration.
pub const SIMPLE_FIRE: u16 = 0x15;

/// A beamformed ping result (the payload the driver exists to receive).
pub const PING_RESULT: u16 = 0x23;

/// Legacy ping result layout kept for older firmware; forwarded to
/// message-subscribers but not parsed as a [`crate::PingView`].
pub const PING_RESULT_LEGACY: u16 = 0x22;

/// Keepalive sent in place of a ping result while the sonar is in standby.
pub const DUMMY: u16 = 0x21;

/// Full user-configurable settings block; forwarded but not parsed.
pub const USER_CONFIG: u16 = 0x2b;

/// `true` iff `msg_id` identifies a (v1 or legacy) ping result.
#[must_use]
pub const fn is_ping_result_id(msg_id: u16) -> bool {
    msg_id == PING_RESULT
}
