//! The periodic UDP status broadcast sonars emit on the local subnet.

use std::net::Ipv4Addr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::header::Header;

/// UDP port every Oculus device broadcasts its status message to.
pub const STATUS_PORT: u16 = 52102;

/// Minimum byte length of a plausible status message; anything shorter is
/// noise on the broadcast address rather than a real device.
pub const MIN_STATUS_SIZE: usize = core::mem::size_of::<StatusMsg>();

/// A sonar's self-announced identity and network address.
///
/// As with [`crate::PingView`], the vendor's full status layout (device
/// type, part number, firmware build, temperature/humidity) is out of
/// scope; this exposes only the fields the driver's connection logic
/// inspects.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct StatusMsg {
    header: Header,
    device_id: [u8; 4],
    connected_ip: [u8; 4],
    state_flags: [u8; 4],
}

impl core::fmt::Debug for StatusMsg {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StatusMsg")
            .field("device_id", &self.device_id())
            .field("ip_addr", &self.ip_addr())
            .field("state_flags", &self.state_flags())
            .finish()
    }
}

impl PartialEq for StatusMsg {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for StatusMsg {}

impl StatusMsg {
    /// Size of a status message on the wire, header included.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// The header of this record.
    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Device id the status message was sent by.
    #[must_use]
    pub fn device_id(&self) -> u32 {
        u32::from_le_bytes(self.device_id)
    }

    /// The sonar's current IPv4 address, to connect the TCP transport to.
    #[must_use]
    pub fn ip_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.connected_ip)
    }

    /// Firmware status flags accompanying the broadcast.
    #[must_use]
    pub fn state_flags(&self) -> u32 {
        u32::from_le_bytes(self.state_flags)
    }

    /// Parses a status message, if `bytes` is at least [`MIN_STATUS_SIZE`]
    /// long and carries a valid header magic.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MIN_STATUS_SIZE {
            return None;
        }
        let msg = Self::ref_from_prefix(bytes).ok()?.0;
        msg.header().is_valid().then_some(*msg)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> StatusMsg {
        StatusMsg {
            header: Header::new(0, 0, 0, 0, 0),
            device_id: 7u32.to_le_bytes(),
            connected_ip: Ipv4Addr::new(192, 168, 1, 45).octets(),
            state_flags: 0u32.to_le_bytes(),
        }
    }

    #[test]
    fn parse_round_trips_ip() {
        let msg = sample();
        let bytes = msg.as_bytes();
        let parsed = StatusMsg::parse(bytes).expect("valid status");
        assert_eq!(parsed.ip_addr(), Ipv4Addr::new(192, 168, 1, 45));
        assert_eq!(parsed.device_id(), 7);
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(StatusMsg::parse(&[0u8; 4]).is_none());
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut msg = sample();
        msg.header = Header::new(0, 0, 0, 0, 0);
        let mut bytes = msg.as_bytes().to_vec();
        bytes[0] = 0;
        bytes[1] = 0;
        assert!(StatusMsg::parse(&bytes).is_none());
    }
}
