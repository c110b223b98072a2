//! The 16-byte message header shared by every Oculus wire message.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Required value of [`Header::magic`] for a well-formed header.
pub const OCULUS_MAGIC: u16 = 0x4f53;

/// Upper bound on `payload_size` used to reject implausible headers before
/// allocating a receive buffer for them. Not specified by the wire format;
/// chosen generously above the largest plausible ping image (32-bit samples,
/// gain row, 512 beams, 4096 ranges is still well under this).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Fixed 16-byte header prefixing every message on the wire.
///
/// Layout is little-endian, packed, no padding. Fields are stored as raw byte
/// arrays rather than native integers because `repr(packed)` does not
/// guarantee field alignment; taking a reference to a misaligned native field
/// is undefined behavior, so every multi-byte field goes through an explicit
/// `from_le_bytes`/`to_le_bytes` accessor instead.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Header {
    magic: [u8; 2],
    src_id: [u8; 2],
    dst_id: [u8; 2],
    msg_id: [u8; 2],
    msg_version: [u8; 2],
    payload_size: [u8; 4],
    reserved: [u8; 2],
}

impl core::fmt::Debug for Header {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Header")
            .field("magic", &self.magic())
            .field("src_id", &self.src_id())
            .field("dst_id", &self.dst_id())
            .field("msg_id", &self.msg_id())
            .field("msg_version", &self.msg_version())
            .field("payload_size", &self.payload_size())
            .field("reserved", &self.reserved())
            .finish()
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}
impl Eq for Header {}

impl Header {
    /// Size of the header on the wire.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Builds a header with the given fields; `payload_size` is taken as-is
    /// (callers that construct a [`crate::Message`] should prefer letting it
    /// compute `payload_size` from the actual payload).
    #[must_use]
    pub fn new(msg_id: u16, msg_version: u16, src_id: u16, dst_id: u16, payload_size: u32) -> Self {
        Self {
            magic: OCULUS_MAGIC.to_le_bytes(),
            src_id: src_id.to_le_bytes(),
            dst_id: dst_id.to_le_bytes(),
            msg_id: msg_id.to_le_bytes(),
            msg_version: msg_version.to_le_bytes(),
            payload_size: payload_size.to_le_bytes(),
            reserved: [0; 2],
        }
    }

    /// Parses a header from the first [`Header::SIZE`] bytes of `bytes`.
    ///
    /// This is the `validate_header` operation: it checks only structural
    /// validity (enough bytes, magic matches). It does not inspect
    /// `payload_size` against any buffer; callers use [`MAX_PAYLOAD_SIZE`]
    /// separately once they know they want to allocate a receive buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ProtocolError::HeaderTooShort { got: bytes.len(), need: Self::SIZE });
        }
        #[allow(clippy::unwrap_used)]
        let header = *Self::ref_from_bytes(&bytes[..Self::SIZE]).unwrap();
        if !header.is_valid() {
            return Err(ProtocolError::InvalidMagic(header.magic()));
        }
        Ok(header)
    }

    /// Serializes the header back to its 16-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        #[allow(clippy::unwrap_used)]
        self.as_bytes().try_into().unwrap()
    }

    /// `true` iff `magic == OCULUS_MAGIC`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.magic() == OCULUS_MAGIC
    }

    /// Magic value; should equal [`OCULUS_MAGIC`] for any message worth trusting.
    #[must_use]
    pub fn magic(&self) -> u16 {
        u16::from_le_bytes(self.magic)
    }

    /// Sender device id (`0` for the host driving the sonar).
    #[must_use]
    pub fn src_id(&self) -> u16 {
        u16::from_le_bytes(self.src_id)
    }

    /// Destination device id.
    #[must_use]
    pub fn dst_id(&self) -> u16 {
        u16::from_le_bytes(self.dst_id)
    }

    /// Sets the destination device id.
    pub fn set_dst_id(&mut self, id: u16) {
        self.dst_id = id.to_le_bytes();
    }

    /// Message type id (see [`crate::ids`]).
    #[must_use]
    pub fn msg_id(&self) -> u16 {
        u16::from_le_bytes(self.msg_id)
    }

    /// Sets the message type id.
    pub fn set_msg_id(&mut self, id: u16) {
        self.msg_id = id.to_le_bytes();
    }

    /// Message version (`2` selects the v2 ping/fire layout, else v1).
    #[must_use]
    pub fn msg_version(&self) -> u16 {
        u16::from_le_bytes(self.msg_version)
    }

    /// Number of payload bytes following this header on the wire.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_le_bytes(self.payload_size)
    }

    /// Sets the payload size field.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_le_bytes();
    }

    /// Reserved field, always `0` on transmit; preserved on parse.
    #[must_use]
    pub fn reserved(&self) -> u16 {
        u16::from_le_bytes(self.reserved)
    }
}

/// Free-function form of [`Header::from_bytes`], matching the component
/// design's `validate_header(bytes[0..16]) -> Option<Header>` naming:
/// returns `None` on any structural problem instead of a typed error, for
/// callers that only care whether resynchronization is needed.
#[must_use]
pub fn validate_header(bytes: &[u8]) -> Option<Header> {
    Header::from_bytes(bytes).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    impl Arbitrary for Header {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (any::<u16>(), any::<u16>(), any::<u16>(), any::<u16>(), any::<u32>())
                .prop_map(|(msg_id, msg_version, src_id, dst_id, payload_size)| {
                    Self::new(msg_id, msg_version, src_id, dst_id, payload_size)
                })
                .boxed()
        }
    }

    #[test]
    fn header_is_sixteen_bytes() {
        assert_eq!(Header::SIZE, 16);
    }

    proptest! {
        #[test]
        fn header_round_trip(header in any::<Header>()) {
            let bytes = header.to_bytes();
            let parsed = Header::from_bytes(&bytes).expect("magic always valid here");
            prop_assert_eq!(parsed.msg_id(), header.msg_id());
            prop_assert_eq!(parsed.msg_version(), header.msg_version());
            prop_assert_eq!(parsed.src_id(), header.src_id());
            prop_assert_eq!(parsed.dst_id(), header.dst_id());
            prop_assert_eq!(parsed.payload_size(), header.payload_size());
        }
    }

    #[test]
    fn reject_short_buffer() {
        let bytes = [0u8; 10];
        assert!(matches!(Header::from_bytes(&bytes), Err(ProtocolError::HeaderTooShort { .. })));
    }

    #[test]
    fn reject_invalid_magic() {
        let header = Header::new(0, 0, 0, 0, 0);
        let mut bytes = header.to_bytes();
        bytes[0] = 0x00;
        bytes[1] = 0x00;
        assert!(matches!(Header::from_bytes(&bytes), Err(ProtocolError::InvalidMagic(0x0000))));
    }

    #[test]
    fn validate_header_returns_none_on_bad_magic() {
        let bytes = [0u8; 16];
        assert!(validate_header(&bytes).is_none());
    }
}
