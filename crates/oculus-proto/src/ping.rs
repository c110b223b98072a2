//! Ping result metadata: the v1/v2 variant view and the firmware-quirk
//! inference rules layered on top of it.
//!
//! The vendor's exact metadata layout is out of scope; core only cares
//! about the fields it inspects (geometry, gain presence, timing). The byte
//! layout below is an invented-but-consistent stand-in that satisfies every
//! field and invariant the driver needs, documented in `DESIGN.md`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{config::PingConfig, header::Header};

/// `data_size_code` decodes to an 8-bit sample.
const SIZE_CODE_8BIT: u8 = 0;
/// `data_size_code` decodes to a 16-bit sample.
const SIZE_CODE_16BIT: u8 = 1;
/// `data_size_code` decodes to a 24-bit sample (v2 only).
const SIZE_CODE_24BIT: u8 = 2;
/// `data_size_code` decodes to a 32-bit sample (v2 only).
const SIZE_CODE_32BIT: u8 = 3;

/// Bytes per range sample in the per-beam gain row the firmware prepends
/// to the image when `has_gains()` is true.
const GAIN_ROW_SAMPLE_SIZE: u32 = 4;

fn decoded_sample_bytes(data_size_code: u8, allow_wide: bool) -> Option<u32> {
    match data_size_code {
        SIZE_CODE_8BIT => Some(1),
        SIZE_CODE_16BIT => Some(2),
        SIZE_CODE_24BIT if allow_wide => Some(3),
        SIZE_CODE_32BIT if allow_wide => Some(4),
        _ => None,
    }
}

/// Metadata fields common to both ping result variants, after the message
/// header and the echoed fire command.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct PingCommon {
    ping_id: [u8; 4],
    status: [u8; 4],
    frequency: [u8; 8],
    temperature: [u8; 8],
    pressure: [u8; 8],
    speed_of_sound_used: [u8; 8],
    ping_start_time: [u8; 8],
    data_size_code: u8,
    _reserved: [u8; 3],
    range_resolution: [u8; 8],
    n_ranges: [u8; 2],
    n_beams: [u8; 2],
    image_offset: [u8; 4],
    image_size: [u8; 4],
    message_size: [u8; 4],
}

impl PingCommon {
    fn ping_id(&self) -> u32 {
        u32::from_le_bytes(self.ping_id)
    }
    fn status(&self) -> u32 {
        u32::from_le_bytes(self.status)
    }
    fn frequency(&self) -> f64 {
        f64::from_le_bytes(self.frequency)
    }
    fn temperature(&self) -> f64 {
        f64::from_le_bytes(self.temperature)
    }
    fn pressure(&self) -> f64 {
        f64::from_le_bytes(self.pressure)
    }
    fn speed_of_sound_used(&self) -> f64 {
        f64::from_le_bytes(self.speed_of_sound_used)
    }
    fn ping_start_time(&self) -> f64 {
        f64::from_le_bytes(self.ping_start_time)
    }
    fn range_resolution(&self) -> f64 {
        f64::from_le_bytes(self.range_resolution)
    }
    fn n_ranges(&self) -> u16 {
        u16::from_le_bytes(self.n_ranges)
    }
    fn n_beams(&self) -> u16 {
        u16::from_le_bytes(self.n_beams)
    }
    fn image_offset(&self) -> u32 {
        u32::from_le_bytes(self.image_offset)
    }
    fn image_size(&self) -> u32 {
        u32::from_le_bytes(self.image_size)
    }
    fn message_size(&self) -> u32 {
        u32::from_le_bytes(self.message_size)
    }
}

/// The v1 ping result metadata block: message header, echoed fire command,
/// and [`PingCommon`]. `has_gains` reads straight off the echoed flags,
/// which firmware actually honors in this version.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PingMetadataV1 {
    header: Header,
    fire_message: PingConfig,
    common: PingCommon,
}

/// The v2 ping result metadata block. Identical shape to v1, but the
/// firmware's `send_gains` flag in the echoed fire command is not honored;
/// gain presence must be inferred from image geometry instead (see
/// [`PingView::has_gains`]).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PingMetadataV2 {
    header: Header,
    fire_message: PingConfig,
    common: PingCommon,
}

macro_rules! common_accessors {
    ($ty:ty) => {
        impl $ty {
            /// The header of this record.
            #[must_use]
            pub fn header(&self) -> Header {
                self.header
            }
            /// The fire command echoed back by the firmware for this ping.
            #[must_use]
            pub fn fire_message(&self) -> PingConfig {
                self.fire_message
            }
            /// Monotonically increasing identifier of this ping.
            #[must_use]
            pub fn ping_id(&self) -> u32 {
                self.common.ping_id()
            }
            /// Firmware status word accompanying the ping.
            #[must_use]
            pub fn status(&self) -> u32 {
                self.common.status()
            }
            /// Operating frequency, in Hz.
            #[must_use]
            pub fn frequency(&self) -> f64 {
                self.common.frequency()
            }
            /// Board temperature, in degrees Celsius.
            #[must_use]
            pub fn temperature(&self) -> f64 {
                self.common.temperature()
            }
            /// Measured pressure, in bar.
            #[must_use]
            pub fn pressure(&self) -> f64 {
                self.common.pressure()
            }
            /// Speed of sound the firmware actually used for this ping, in m/s.
            #[must_use]
            pub fn speed_of_sound_used(&self) -> f64 {
                self.common.speed_of_sound_used()
            }
            /// Firmware-side ping start time, in seconds.
            #[must_use]
            pub fn ping_start_time(&self) -> f64 {
                self.common.ping_start_time()
            }
            /// Distance, in meters, spanned by one range sample.
            #[must_use]
            pub fn range_resolution(&self) -> f64 {
                self.common.range_resolution()
            }
            /// Number of range samples per beam.
            #[must_use]
            pub fn n_ranges(&self) -> u16 {
                self.common.n_ranges()
            }
            /// Number of beams in the image.
            #[must_use]
            pub fn n_beams(&self) -> u16 {
                self.common.n_beams()
            }
            /// Byte offset of the image data within the payload.
            #[must_use]
            pub fn image_offset(&self) -> u32 {
                self.common.image_offset()
            }
            /// Size of the image data, in bytes.
            #[must_use]
            pub fn image_size(&self) -> u32 {
                self.common.image_size()
            }
            /// Total size of the ping result message.
            #[must_use]
            pub fn message_size(&self) -> u32 {
                self.common.message_size()
            }
            /// Firmware's sample-size code; decode with care, see `has_gains`/`sample_size`.
            #[must_use]
            pub fn data_size_code(&self) -> u8 {
                self.common.data_size_code
            }
        }
    };
}

common_accessors!(PingMetadataV1);
common_accessors!(PingMetadataV2);

impl PingMetadataV1 {
    /// `true` iff the echoed fire command asked for a per-row gain table.
    /// v1 firmware honors this flag, so no inference is needed.
    #[must_use]
    pub fn has_gains(&self) -> bool {
        self.fire_message().flags() & crate::config::FLAG_SEND_GAINS != 0
    }

    /// Bytes per range sample: one or two, from the echoed 16-bit-data flag.
    #[must_use]
    pub fn sample_size(&self) -> u32 {
        if self.fire_message().flags() & crate::config::FLAG_DATA_16BIT != 0 {
            2
        } else {
            1
        }
    }
}

impl PingMetadataV2 {
    /// Decodes `data_size_code` without ever consulting image geometry.
    /// Returns `None` for a `data_size_code` outside `0..=3`; never
    /// recurses into [`Self::sample_size`]'s geometry-based fallback.
    fn decoded_sample_bytes(&self) -> Option<u32> {
        decoded_sample_bytes(self.data_size_code(), true)
    }

    /// `true` iff the ping carries a per-range gain row.
    ///
    /// The v2 firmware's `send_gains` echo bit is unreliable, so gain
    /// presence is inferred from whether `image_size` is large enough to
    /// hold a gain row on top of the plain image. When `data_size_code` is
    /// outside the valid range this returns `false` rather than trying to
    /// infer anything from `sample_size`, which breaks the circular
    /// dependency the two quantities would otherwise have.
    #[must_use]
    pub fn has_gains(&self) -> bool {
        let Some(sample_bytes) = self.decoded_sample_bytes() else {
            return false;
        };
        let n_ranges = u32::from(self.n_ranges());
        let n_beams = u32::from(self.n_beams());
        let Some(plain) = n_ranges.checked_mul(n_beams).and_then(|v| v.checked_mul(sample_bytes))
        else {
            return false;
        };
        let gain_row = n_ranges.saturating_mul(GAIN_ROW_SAMPLE_SIZE);
        self.image_size() >= plain.saturating_add(gain_row)
    }

    /// Bytes per range sample.
    ///
    /// When `data_size_code` decodes cleanly this is authoritative. When it
    /// doesn't, falls back to dividing the image payload (minus the gain
    /// row if [`Self::has_gains`] says there is one) by the sample count;
    /// `has_gains` never calls back into this method, so the fallback
    /// cannot recurse.
    #[must_use]
    pub fn sample_size(&self) -> u32 {
        if let Some(bytes) = self.decoded_sample_bytes() {
            return bytes;
        }
        let n_ranges = u32::from(self.n_ranges());
        let n_beams = u32::from(self.n_beams());
        let denom = n_ranges.saturating_mul(n_beams);
        if denom == 0 {
            return 1;
        }
        let gain_row = if self.has_gains() { n_ranges.saturating_mul(GAIN_ROW_SAMPLE_SIZE) } else { 0 };
        (self.image_size().saturating_sub(gain_row) / denom).max(1)
    }

    /// Byte offset of the gain row within the image, if present.
    #[must_use]
    pub fn gain_row_offset(&self) -> Option<u32> {
        self.has_gains().then_some(self.image_offset())
    }

    /// Stride, in bytes, of one beam's range samples.
    #[must_use]
    pub fn row_stride(&self) -> u32 {
        u32::from(self.n_ranges()) * self.sample_size()
    }
}

/// A parsed ping result, dispatched on `header.msg_version()`.
#[derive(Clone, Copy, Debug)]
pub enum PingView {
    /// `msg_version != 2`.
    V1(PingMetadataV1),
    /// `msg_version == 2`.
    V2(PingMetadataV2),
}

impl core::fmt::Debug for PingMetadataV1 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PingMetadataV1")
            .field("ping_id", &self.ping_id())
            .field("n_ranges", &self.n_ranges())
            .field("n_beams", &self.n_beams())
            .field("has_gains", &self.has_gains())
            .finish()
    }
}

impl core::fmt::Debug for PingMetadataV2 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PingMetadataV2")
            .field("ping_id", &self.ping_id())
            .field("n_ranges", &self.n_ranges())
            .field("n_beams", &self.n_beams())
            .field("data_size_code", &self.data_size_code())
            .field("has_gains", &self.has_gains())
            .finish()
    }
}

impl PingView {
    /// Minimum number of metadata bytes (header included) required before
    /// the image payload itself.
    pub const MIN_SIZE: usize = core::mem::size_of::<PingMetadataV1>();

    /// Parses ping metadata from the front of a ping result payload,
    /// selecting the v1 or v2 layout from `header.msg_version()`.
    #[must_use]
    pub fn parse(header: Header, bytes: &[u8]) -> Option<Self> {
        if header.msg_version() == 2 {
            PingMetadataV2::ref_from_prefix(bytes).ok().map(|(view, _)| Self::V2(*view))
        } else {
            PingMetadataV1::ref_from_prefix(bytes).ok().map(|(view, _)| Self::V1(*view))
        }
    }

    /// The header of this record.
    #[must_use]
    pub fn header(&self) -> Header {
        match self {
            Self::V1(v) => v.header(),
            Self::V2(v) => v.header(),
        }
    }

    /// The fire command echoed back by the firmware for this ping.
    #[must_use]
    pub fn fire_message(&self) -> PingConfig {
        match self {
            Self::V1(v) => v.fire_message(),
            Self::V2(v) => v.fire_message(),
        }
    }

    /// Number of range samples per beam.
    #[must_use]
    pub fn n_ranges(&self) -> u16 {
        match self {
            Self::V1(v) => v.n_ranges(),
            Self::V2(v) => v.n_ranges(),
        }
    }

    /// Number of beams in the image.
    #[must_use]
    pub fn n_beams(&self) -> u16 {
        match self {
            Self::V1(v) => v.n_beams(),
            Self::V2(v) => v.n_beams(),
        }
    }

    /// Byte offset of the image data within the payload.
    #[must_use]
    pub fn image_offset(&self) -> u32 {
        match self {
            Self::V1(v) => v.image_offset(),
            Self::V2(v) => v.image_offset(),
        }
    }

    /// Size of the image data, in bytes.
    #[must_use]
    pub fn image_size(&self) -> u32 {
        match self {
            Self::V1(v) => v.image_size(),
            Self::V2(v) => v.image_size(),
        }
    }

    /// Bytes per range sample.
    #[must_use]
    pub fn sample_size(&self) -> u32 {
        match self {
            Self::V1(v) => v.sample_size(),
            Self::V2(v) => v.sample_size(),
        }
    }

    /// `true` if the image carries a per-range gain row.
    #[must_use]
    pub fn has_gains(&self) -> bool {
        match self {
            Self::V1(v) => v.has_gains(),
            Self::V2(v) => v.has_gains(),
        }
    }

    /// `true` when `master_mode == 2`: firmware remaps the gain percentage
    /// into `[40, 100]` before reporting it, so readers of `fire_message`
    /// should rescale via [`rescale_reported_gain`].
    #[must_use]
    pub fn needs_gain_rescale(&self) -> bool {
        self.fire_message().master_mode() == 2
    }

    /// Byte offset, within the payload, where the bearing table (one `i16`
    /// per beam) begins. The bearing table immediately precedes the image
    /// data, so it ends exactly at `image_offset`.
    #[must_use]
    pub fn bearing_table_offset(&self) -> u32 {
        self.image_offset().saturating_sub(u32::from(self.n_beams()) * 2)
    }

    /// Bearing of beam `index`, in radians, or `None` if out of range.
    /// Raw units are hundredths of a degree.
    #[must_use]
    pub fn bearing_radians(&self, index: usize, payload: &[u8]) -> Option<f64> {
        let base = self.bearing_table_offset() as usize + index * 2;
        let raw = payload.get(base..base + 2)?;
        let centidegrees = i16::from_le_bytes([raw[0], raw[1]]);
        Some(f64::from(centidegrees) * 0.01 * core::f64::consts::PI / 180.0)
    }

    /// Stride, in bytes, of one beam's row within the image (gain column
    /// included, if present).
    #[must_use]
    pub fn row_stride(&self) -> u32 {
        let plain = u32::from(self.n_ranges()) * self.sample_size();
        if self.has_gains() {
            plain + GAIN_ROW_SAMPLE_SIZE
        } else {
            plain
        }
    }

    /// Per-row gain coefficient for beam `index`, derived from the leading
    /// `u32` of that beam's row as `1/√u32`, or `None` if this ping has no
    /// gain column or the row falls outside `payload`.
    #[must_use]
    pub fn gain_for_row(&self, index: usize, payload: &[u8]) -> Option<f64> {
        if !self.has_gains() {
            return None;
        }
        let base = self.image_offset() as usize + index * self.row_stride() as usize;
        let raw = payload.get(base..base + 4)?;
        let bits = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if bits == 0 {
            return None;
        }
        Some(1.0 / f64::from(bits).sqrt())
    }
}

/// Firmware in `master_mode == 2` remaps the requested gain percentage
/// `[0, 100]` into `[40, 100]` before reporting it back. This undoes that
/// remap so the reported value matches what the caller actually asked for.
#[must_use]
pub fn rescale_reported_gain(reported_gain_percent: f64) -> f64 {
    (reported_gain_percent - 40.0) * 100.0 / 60.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use zerocopy::IntoBytes;

    use super::*;

    fn v2_metadata(n_ranges: u16, n_beams: u16, image_size: u32, data_size_code: u8) -> PingMetadataV2 {
        let header = Header::new(crate::ids::PING_RESULT, 2, 0, 1, 0);
        let fire_message = crate::config::default_ping_config();
        let common = PingCommon {
            ping_id: 1u32.to_le_bytes(),
            status: 0u32.to_le_bytes(),
            frequency: 0.0f64.to_le_bytes(),
            temperature: 0.0f64.to_le_bytes(),
            pressure: 0.0f64.to_le_bytes(),
            speed_of_sound_used: 1500.0f64.to_le_bytes(),
            ping_start_time: 0.0f64.to_le_bytes(),
            data_size_code,
            _reserved: [0; 3],
            range_resolution: 0.01f64.to_le_bytes(),
            n_ranges: n_ranges.to_le_bytes(),
            n_beams: n_beams.to_le_bytes(),
            image_offset: (n_beams as u32 * 2).to_le_bytes(),
            image_size: image_size.to_le_bytes(),
            message_size: 0u32.to_le_bytes(),
        };
        PingMetadataV2 { header, fire_message, common }
    }

    #[test]
    fn v2_has_gains_true_when_image_size_includes_gain_row() {
        let without_gains = 10u32 * 5 * 2;
        let with_gains = without_gains + 10 * 4;
        let view = v2_metadata(10, 5, with_gains, SIZE_CODE_16BIT);
        assert!(view.has_gains());
        assert_eq!(view.sample_size(), 2);
    }

    #[test]
    fn v2_has_gains_false_without_extra_bytes() {
        let plain = 10u32 * 5 * 2;
        let view = v2_metadata(10, 5, plain, SIZE_CODE_16BIT);
        assert!(!view.has_gains());
    }

    #[test]
    fn v2_invalid_data_size_code_never_recurses() {
        let view = v2_metadata(10, 5, 1000, 0xff);
        assert!(!view.has_gains());
        assert!(view.sample_size() >= 1);
    }

    #[test]
    fn v2_invalid_code_falls_back_to_geometry() {
        let view = v2_metadata(10, 5, 500, 0xff);
        let expected = 500 / (10 * 5);
        assert_eq!(view.sample_size(), expected.max(1));
    }

    #[test]
    fn v1_has_gains_reads_fire_message_flag() {
        let header = Header::new(crate::ids::PING_RESULT, 1, 0, 1, 0);
        let mut fire_message = crate::config::default_ping_config();
        fire_message.set_flags(crate::config::FLAG_SEND_GAINS);
        let common_bytes = v2_metadata(1, 1, 4, SIZE_CODE_8BIT).as_bytes().to_vec();
        let common = *PingCommon::ref_from_bytes(&common_bytes[(Header::SIZE + PingConfig::SIZE)..]).unwrap();
        let view = PingMetadataV1 { header, fire_message, common };
        assert!(view.has_gains());
    }

    #[test]
    fn rescale_reported_gain_inverts_firmware_remap() {
        assert!((rescale_reported_gain(40.0) - 0.0).abs() < 1e-9);
        assert!((rescale_reported_gain(100.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn bearing_table_precedes_image() {
        let view = v2_metadata(4, 3, 24 + 4 * 4, SIZE_CODE_16BIT);
        assert_eq!(view.bearing_table_offset(), view.image_offset() - 6);
    }

    #[test]
    fn gain_for_row_decodes_inverse_square_root() {
        let n_ranges = 2u16;
        let n_beams = 1u16;
        let without_gains = u32::from(n_ranges) * u32::from(n_beams) * 2;
        let image_size = without_gains + u32::from(n_ranges) * GAIN_ROW_SAMPLE_SIZE;
        let metadata = v2_metadata(n_ranges, n_beams, image_size, SIZE_CODE_16BIT);
        let view = PingView::V2(metadata);

        let image_offset = view.image_offset() as usize;
        let mut payload = vec![0u8; image_offset + view.row_stride() as usize];
        payload[image_offset..image_offset + 4].copy_from_slice(&4u32.to_le_bytes());

        let gain = view.gain_for_row(0, &payload).expect("gain present");
        assert!((gain - 0.5).abs() < 1e-9);
    }
}
