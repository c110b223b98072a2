//! On-disk log file structures: the file header and the per-entry item
//! header written by the recorder and read back by the file reader.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Magic number identifying a valid log file.
pub const FILE_MAGIC: u32 = 0x1122_3344;
/// Magic number identifying a valid log item.
pub const ITEM_MAGIC: u32 = 0xaabb_ccdd;
/// Only file format version this reader accepts without a warning.
pub const FILE_VERSION: u16 = 1;

/// Item carries a raw ping result ([`crate::Message`] payload).
pub const RECORD_TYPE_OCULUS_SONAR: u16 = 10;
/// Item carries a [`LogItem`]-only timestamp sidecar for the preceding
/// sonar item, recorded separately so the payload item stays a faithful
/// byte-for-byte copy of what the sonar sent.
pub const RECORD_TYPE_OCULUS_SONAR_STAMP: u16 = 1010;

/// Source identifier stamped into every file header, matching the vendor
/// tool's own 12-character-max convention, null-padded to 16 bytes.
pub const SOURCE_ID: &[u8; 16] = b"Oculus\0\0\0\0\0\0\0\0\0\0";

/// Fixed 44-byte header at the start of every log file.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogFileHeader {
    magic: [u8; 4],
    header_size: [u8; 4],
    source: [u8; 16],
    version: [u8; 2],
    encryption: [u8; 2],
    key: [u8; 8],
    time: [u8; 8],
}

impl core::fmt::Debug for LogFileHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogFileHeader")
            .field("magic", &self.magic())
            .field("header_size", &self.header_size())
            .field("source", &self.source())
            .field("version", &self.version())
            .field("encryption", &self.encryption())
            .field("time", &self.time())
            .finish()
    }
}

impl PartialEq for LogFileHeader {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for LogFileHeader {}

impl LogFileHeader {
    /// Size of the file header on disk.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Builds a fresh, unencrypted file header stamped with `time`
    /// (seconds since the Unix epoch).
    #[must_use]
    pub fn new(time: f64) -> Self {
        Self {
            magic: FILE_MAGIC.to_le_bytes(),
            header_size: (Self::SIZE as u32).to_le_bytes(),
            source: *SOURCE_ID,
            version: FILE_VERSION.to_le_bytes(),
            encryption: 0u16.to_le_bytes(),
            key: [0; 8],
            time: time.to_le_bytes(),
        }
    }

    /// File magic number; should equal `FILE_MAGIC`.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_le_bytes(self.magic)
    }

    /// Size of this header structure, as recorded by the writer.
    #[must_use]
    pub fn header_size(&self) -> u32 {
        u32::from_le_bytes(self.header_size)
    }

    /// Null-padded source identifier (`"Oculus\0…"`).
    #[must_use]
    pub fn source(&self) -> [u8; 16] {
        self.source
    }

    /// File format version.
    #[must_use]
    pub fn version(&self) -> u16 {
        u16::from_le_bytes(self.version)
    }

    /// Nonzero if the file body is encrypted (unsupported by this reader).
    #[must_use]
    pub fn encryption(&self) -> u16 {
        u16::from_le_bytes(self.encryption)
    }

    /// Wall-clock time this record was written, in seconds since the Unix epoch.
    #[must_use]
    pub fn time(&self) -> f64 {
        f64::from_le_bytes(self.time)
    }

    /// `true` iff `magic` matches [`FILE_MAGIC`] and the file claims to be
    /// unencrypted, the only form this reader can open.
    #[must_use]
    pub fn is_openable(&self) -> bool {
        self.magic() == FILE_MAGIC && self.encryption() == 0
    }
}

/// Fixed 28-byte header preceding every item's payload.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogItem {
    item_magic: [u8; 4],
    item_size: [u8; 4],
    item_type: [u8; 2],
    version: [u8; 2],
    time: [u8; 8],
    compressed_size: [u8; 4],
    spare: [u8; 4],
}

impl core::fmt::Debug for LogItem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogItem")
            .field("item_magic", &self.item_magic())
            .field("item_size", &self.item_size())
            .field("item_type", &self.item_type())
            .field("time", &self.time())
            .finish()
    }
}

impl PartialEq for LogItem {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for LogItem {}

impl LogItem {
    /// Size of an item header on disk.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Builds an item header. `payload_size` does not include this header;
    /// `item_size` on disk is the total of header plus payload.
    #[must_use]
    pub fn new(item_type: u16, time: f64, payload_size: u32) -> Self {
        Self {
            item_magic: ITEM_MAGIC.to_le_bytes(),
            item_size: (payload_size + Self::SIZE as u32).to_le_bytes(),
            item_type: item_type.to_le_bytes(),
            version: 1u16.to_le_bytes(),
            time: time.to_le_bytes(),
            compressed_size: 0u32.to_le_bytes(),
            spare: [0; 4],
        }
    }

    /// Sentinel item header used to signal end-of-file to the reader: all
    /// zero, so `item_magic() != ITEM_MAGIC`.
    #[must_use]
    pub fn eof_sentinel() -> Self {
        Self::read_from_bytes(&[0u8; Self::SIZE]).unwrap_or_else(|_| unreachable!())
    }

    /// Item magic number; should equal `ITEM_MAGIC`.
    #[must_use]
    pub fn item_magic(&self) -> u32 {
        u32::from_le_bytes(self.item_magic)
    }

    /// Total size of this item on disk, header included.
    #[must_use]
    pub fn item_size(&self) -> u32 {
        u32::from_le_bytes(self.item_size)
    }

    /// Payload size: `item_size` minus this header.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        self.item_size().saturating_sub(Self::SIZE as u32)
    }

    /// Record type (see the `RECORD_TYPE_*` constants).
    #[must_use]
    pub fn item_type(&self) -> u16 {
        u16::from_le_bytes(self.item_type)
    }

    /// Wall-clock time this record was written, in seconds since the Unix epoch.
    #[must_use]
    pub fn time(&self) -> f64 {
        f64::from_le_bytes(self.time)
    }

    /// `true` iff `item_magic` matches `ITEM_MAGIC`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.item_magic() == ITEM_MAGIC
    }
}

/// Nanosecond-precision sidecar payload for an `OculusSonarStamp` item,
/// kept separate from the sonar item itself so that item stays an exact
/// copy of what the sonar sent. ROS-compatible split representation rather
/// than a single nanosecond count, matching the vendor recorder.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SonarStamp {
    seconds: [u8; 8],
    nanoseconds: [u8; 8],
}

impl core::fmt::Debug for SonarStamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SonarStamp").field("seconds", &self.seconds()).field("nanoseconds", &self.nanoseconds()).finish()
    }
}

impl PartialEq for SonarStamp {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for SonarStamp {}

impl SonarStamp {
    /// Size of this payload on disk.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Splits `time` into whole seconds since the Unix epoch and the
    /// remaining nanoseconds, saturating at zero for times before it.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self { seconds: since_epoch.as_secs().to_le_bytes(), nanoseconds: u64::from(since_epoch.subsec_nanos()).to_le_bytes() }
    }

    /// Whole seconds since the Unix epoch.
    #[must_use]
    pub fn seconds(&self) -> u64 {
        u64::from_le_bytes(self.seconds)
    }

    /// Nanoseconds past `seconds`.
    #[must_use]
    pub fn nanoseconds(&self) -> u64 {
        u64::from_le_bytes(self.nanoseconds)
    }

    /// Reconstructs the original [`SystemTime`] at nanosecond precision.
    #[must_use]
    pub fn to_system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.seconds()) + Duration::from_nanos(self.nanoseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_is_forty_four_bytes() {
        assert_eq!(LogFileHeader::SIZE, 44);
    }

    #[test]
    fn item_header_is_twenty_eight_bytes() {
        assert_eq!(LogItem::SIZE, 28);
    }

    #[test]
    fn new_file_header_is_openable() {
        let header = LogFileHeader::new(1_700_000_000.0);
        assert!(header.is_openable());
        assert_eq!(header.version(), FILE_VERSION);
        assert_eq!(header.header_size(), LogFileHeader::SIZE as u32);
        assert_eq!(&header.source(), SOURCE_ID);
    }

    #[test]
    fn item_size_includes_header() {
        let item = LogItem::new(RECORD_TYPE_OCULUS_SONAR, 12.5, 100);
        assert_eq!(item.item_size(), 128);
        assert_eq!(item.payload_size(), 100);
    }

    #[test]
    fn eof_sentinel_is_invalid() {
        assert!(!LogItem::eof_sentinel().is_valid());
    }

    #[test]
    fn sonar_stamp_is_sixteen_bytes() {
        assert_eq!(SonarStamp::SIZE, 16);
    }

    #[test]
    fn sonar_stamp_round_trips_nanosecond_precision() {
        let time = UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789);
        let stamp = SonarStamp::from_system_time(time);
        assert_eq!(stamp.seconds(), 1_700_000_000);
        assert_eq!(stamp.nanoseconds(), 123_456_789);
        assert_eq!(stamp.to_system_time(), time);
    }

    #[test]
    fn sonar_stamp_saturates_before_epoch() {
        let stamp = SonarStamp::from_system_time(UNIX_EPOCH - Duration::from_secs(5));
        assert_eq!(stamp.seconds(), 0);
        assert_eq!(stamp.nanoseconds(), 0);
    }
}
