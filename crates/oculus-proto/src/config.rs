//! The fire command (`PingConfig`) and the pure functions that govern
//! firmware acknowledgment and change detection for it.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    header::Header,
    ids::{self, SIMPLE_FIRE},
};

/// Stop pinging without disconnecting.
pub const PING_RATE_STANDBY: u8 = 0;
/// Normal ping cadence.
pub const PING_RATE_NORMAL: u8 = 1;
/// Maximum ping cadence.
pub const PING_RATE_HIGH: u8 = 2;
/// Reduced ping cadence.
pub const PING_RATE_LOW: u8 = 3;

/// `range_in_meters` bit of [`PingConfig::flags`].
pub const FLAG_RANGE_IN_METERS: u8 = 0x01;
/// `data_16bit` bit of [`PingConfig::flags`].
pub const FLAG_DATA_16BIT: u8 = 0x02;
/// `send_gains` bit of [`PingConfig::flags`].
pub const FLAG_SEND_GAINS: u8 = 0x04;
/// `simple_ping` bit of [`PingConfig::flags`].
pub const FLAG_SIMPLE_PING: u8 = 0x08;

/// The fire command that configures and triggers the sonar's imaging mode.
///
/// Wire layout: a [`Header`] followed by five single-byte fields and four
/// little-endian doubles. Float fields are stored as raw byte arrays, not
/// native `f64`s, because `repr(packed)` does not guarantee their alignment.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PingConfig {
    header: Header,
    master_mode: u8,
    ping_rate: u8,
    network_speed: u8,
    gamma: u8,
    flags: u8,
    _reserved: [u8; 3],
    range: [u8; 8],
    gain_percent: [u8; 8],
    speed_of_sound: [u8; 8],
    salinity: [u8; 8],
}

impl core::fmt::Debug for PingConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PingConfig")
            .field("master_mode", &self.master_mode())
            .field("ping_rate", &self.ping_rate())
            .field("network_speed", &self.network_speed())
            .field("gamma", &self.gamma())
            .field("flags", &self.flags())
            .field("range", &self.range())
            .field("gain_percent", &self.gain_percent())
            .field("speed_of_sound", &self.speed_of_sound())
            .field("salinity", &self.salinity())
            .finish()
    }
}

impl PartialEq for PingConfig {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for PingConfig {}

impl PingConfig {
    /// Size of the fire command on the wire, header included.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// The header of this record.
    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Overwrites the header.
    pub fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    /// Imaging mode: `1` for long range, `2` for short range/high frequency.
    #[must_use]
    pub fn master_mode(&self) -> u8 {
        self.master_mode
    }

    /// Sets the master mode (`2` selects short-range/high-frequency).
    pub fn set_master_mode(&mut self, value: u8) {
        self.master_mode = value;
    }

    /// Requested ping cadence.
    #[must_use]
    pub fn ping_rate(&self) -> u8 {
        self.ping_rate
    }

    /// Sets the requested ping cadence.
    pub fn set_ping_rate(&mut self, value: u8) {
        self.ping_rate = value;
    }

    /// Network throttle byte as last stamped for send.
    #[must_use]
    pub fn network_speed(&self) -> u8 {
        self.network_speed
    }

    /// Sets the network speed throttle byte.
    pub fn set_network_speed(&mut self, value: u8) {
        self.network_speed = value;
    }

    /// Gamma correction applied to the returned image.
    #[must_use]
    pub fn gamma(&self) -> u8 {
        self.gamma
    }

    /// Option flags bitfield (see the `FLAG_*` constants).
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Sets the option flags bitfield.
    pub fn set_flags(&mut self, value: u8) {
        self.flags = value;
    }

    /// Requested range, in meters.
    #[must_use]
    pub fn range(&self) -> f64 {
        f64::from_le_bytes(self.range)
    }

    /// Sets the requested range, in meters.
    pub fn set_range(&mut self, value: f64) {
        self.range = value.to_le_bytes();
    }

    /// Requested gain percentage.
    #[must_use]
    pub fn gain_percent(&self) -> f64 {
        f64::from_le_bytes(self.gain_percent)
    }

    /// Sets the requested gain percentage.
    pub fn set_gain_percent(&mut self, value: f64) {
        self.gain_percent = value.to_le_bytes();
    }

    /// Speed of sound override, in m/s; `0.0` defers to `salinity`.
    #[must_use]
    pub fn speed_of_sound(&self) -> f64 {
        f64::from_le_bytes(self.speed_of_sound)
    }

    /// Water salinity, in ppt, used to estimate speed of sound when `speed_of_sound` is `0.0`.
    #[must_use]
    pub fn salinity(&self) -> f64 {
        f64::from_le_bytes(self.salinity)
    }

    /// Stamps the header fields the driver owns before sending: magic,
    /// `SIMPLE_FIRE`, source id `0`, and `payload_size` covering everything
    /// after the header.
    pub fn stamp_for_send(&mut self, dst_id: u16) {
        let payload_size = (Self::SIZE - Header::SIZE) as u32;
        self.header = Header::new(SIMPLE_FIRE, self.header.msg_version(), 0, dst_id, payload_size);
        self.network_speed = 0xff;
    }
}

/// The configuration the driver requests on first connect and whenever the
/// caller hasn't asked for anything else: mode 2 (short range / high
/// frequency), normal ping rate, per-row gains enabled, range in meters.
#[must_use]
pub fn default_ping_config() -> PingConfig {
    let mut config = PingConfig::new_zeroed();
    config.master_mode = 2;
    config.network_speed = 0xff;
    config.gamma = 127;
    config.ping_rate = PING_RATE_NORMAL;
    config.range = 2.54_f64.to_le_bytes();
    config.gain_percent = 50.0_f64.to_le_bytes();
    config.flags = FLAG_RANGE_IN_METERS | FLAG_SEND_GAINS | FLAG_SIMPLE_PING;
    config
}

/// Accepts a configuration acknowledgment.
///
/// If the request asked for standby, any `DUMMY` feedback is accepted
/// (firmware acknowledges standby with a dummy message, not a ping result).
/// Otherwise feedback must be a ping result whose integer fields match
/// exactly and whose float fields match within tolerance; `ping_rate` is
/// deliberately excluded because the firmware never echoes it.
#[must_use]
pub fn config_equivalent(
    requested: &PingConfig,
    feedback_msg_id: u16,
    feedback: &PingConfig,
) -> bool {
    if requested.ping_rate() == PING_RATE_STANDBY {
        return feedback_msg_id == ids::DUMMY;
    }
    if feedback_msg_id != ids::PING_RESULT {
        return false;
    }
    if requested.master_mode() != feedback.master_mode()
        || requested.gamma() != feedback.gamma()
        || requested.flags() != feedback.flags()
        || requested.range() != feedback.range()
    {
        return false;
    }
    if (requested.gain_percent() - feedback.gain_percent()).abs() >= 0.1 {
        return false;
    }
    if requested.speed_of_sound() != 0.0 {
        (requested.speed_of_sound() - feedback.speed_of_sound()).abs() < 0.1
    } else {
        (requested.salinity() - feedback.salinity()).abs() < 0.1
    }
}

/// `true` if any field a subscriber would care about differs between two
/// configurations. Integer fields must match exactly; float fields tolerate
/// firmware jitter.
#[must_use]
pub fn config_changed(previous: &PingConfig, next: &PingConfig) -> bool {
    if previous.master_mode() != next.master_mode()
        || previous.ping_rate() != next.ping_rate()
        || previous.network_speed() != next.network_speed()
        || previous.gamma() != next.gamma()
        || previous.flags() != next.flags()
    {
        return true;
    }
    (previous.range() - next.range()).abs() > 1e-3
        || (previous.gain_percent() - next.gain_percent()).abs() > 0.1
        || (previous.speed_of_sound() - next.speed_of_sound()).abs() > 0.1
        || (previous.salinity() - next.salinity()).abs() > 0.1
}
