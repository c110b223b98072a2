//! Reads a log file written by [`crate::Recorder`] back into messages.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    time::{Duration, UNIX_EPOCH},
};

use bytes::Bytes;
use oculus_core::{OculusError, Result};
use oculus_proto::{
    log::{LogFileHeader, LogItem, RECORD_TYPE_OCULUS_SONAR, RECORD_TYPE_OCULUS_SONAR_STAMP},
    Header, Message, SonarStamp,
};
use tracing::warn;
use zerocopy::FromBytes;

/// Reads messages back out of a log file written by [`crate::Recorder`].
///
/// Blocking, for the same reason [`crate::Recorder`] is: log files are
/// read sequentially from local disk, not off a socket.
pub struct FileReader {
    file: File,
    data_start: u64,
}

impl FileReader {
    /// Opens `path`, validating the file header. Rejects encrypted files
    /// (unsupported) and files with a bad magic number; warns but
    /// proceeds on an unexpected format version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path).map_err(OculusError::Io)?;
        let mut header_bytes = [0u8; LogFileHeader::SIZE];
        file.read_exact(&mut header_bytes).map_err(OculusError::Io)?;
        let header = LogFileHeader::read_from_bytes(&header_bytes)
            .map_err(|_| OculusError::LogFormatInvalid("truncated file header"))?;
        if !header.is_openable() {
            return Err(OculusError::LogFormatInvalid("bad magic or unsupported encryption"));
        }
        if header.version() != oculus_proto::log::FILE_VERSION {
            warn!(version = header.version(), "log file has an unexpected format version, reading anyway");
        }
        let data_start = LogFileHeader::SIZE as u64;
        Ok(Self { file, data_start })
    }

    /// Reads one raw item (header and payload), or `None` at a clean EOF.
    fn read_raw_item(&mut self) -> Result<Option<(LogItem, Vec<u8>)>> {
        let mut item_bytes = [0u8; LogItem::SIZE];
        match self.file.read_exact(&mut item_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(OculusError::Io(e)),
        }
        let item = LogItem::read_from_bytes(&item_bytes)
            .map_err(|_| OculusError::LogFormatInvalid("malformed item header"))?;
        if !item.is_valid() {
            return Err(OculusError::LogFormatInvalid("bad item magic"));
        }
        let mut payload = vec![0u8; item.payload_size() as usize];
        self.file.read_exact(&mut payload).map_err(OculusError::Io)?;
        Ok(Some((item, payload)))
    }

    /// Advances past one item without decoding its payload.
    pub fn jump_item(&mut self) -> Result<bool> {
        Ok(self.read_raw_item()?.is_some())
    }

    /// Reads the next `OculusSonar` item, pairing it with its
    /// `OculusSonarStamp` sidecar if the very next item is one (falling
    /// back to the sonar item's own timestamp for older logs that don't
    /// have a sidecar). Skips any other item types transparently.
    pub fn read_next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let Some((item, payload)) = self.read_raw_item()? else {
                return Ok(None);
            };
            if item.item_type() != RECORD_TYPE_OCULUS_SONAR {
                continue;
            }
            if payload.len() < Header::SIZE {
                return Err(OculusError::PingPayloadInconsistent("sonar item shorter than one header"));
            }
            let header = Header::from_bytes(&payload[..Header::SIZE])?;
            let data = Bytes::copy_from_slice(&payload[Header::SIZE..]);

            let position_before_next = self.file.stream_position().map_err(OculusError::Io)?;
            let timestamp = match self.read_raw_item()? {
                Some((stamp, stamp_payload)) if stamp.item_type() == RECORD_TYPE_OCULUS_SONAR_STAMP => {
                    SonarStamp::read_from_bytes(&stamp_payload)
                        .map(|s| s.to_system_time())
                        .unwrap_or_else(|_| UNIX_EPOCH + Duration::from_secs_f64(item.time().max(0.0)))
                }
                Some(_) => {
                    self.file.seek(SeekFrom::Start(position_before_next)).map_err(OculusError::Io)?;
                    UNIX_EPOCH + Duration::from_secs_f64(item.time().max(0.0))
                }
                None => UNIX_EPOCH + Duration::from_secs_f64(item.time().max(0.0)),
            };
            return Ok(Some(Message::with_timestamp(header, data, timestamp)));
        }
    }

    /// Reads the next message that is specifically a ping result, skipping
    /// any other sonar item types in between.
    pub fn read_next_ping(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(message) = self.read_next_message()? else {
                return Ok(None);
            };
            if message.is_ping_message() {
                return Ok(Some(message));
            }
        }
    }

    /// Seeks back to the first item, right after the file header.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.data_start))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use oculus_proto::ids;

    use super::*;
    use crate::recorder::Recorder;

    #[test]
    fn open_rejects_bad_magic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.oculus");
        std::fs::write(&path, [0u8; LogFileHeader::SIZE]).expect("write");
        assert!(matches!(FileReader::open(&path), Err(OculusError::LogFormatInvalid(_))));
    }

    #[test]
    fn rewind_allows_rereading_the_same_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");
        let message = Message::parse_message(Header::new(ids::DUMMY, 1, 0, 1, 0), Bytes::new());
        {
            let mut recorder = Recorder::create(&path).expect("create");
            recorder.write_message(&message).expect("write");
        }
        let mut reader = FileReader::open(&path).expect("open");
        let first = reader.read_next_message().expect("read").expect("some");
        reader.rewind().expect("rewind");
        let second = reader.read_next_message().expect("read").expect("some");
        assert_eq!(first.message_id(), second.message_id());
    }

    #[test]
    fn read_next_ping_skips_non_ping_messages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");
        {
            let mut recorder = Recorder::create(&path).expect("create");
            recorder
                .write_message(&Message::parse_message(Header::new(ids::DUMMY, 1, 0, 1, 0), Bytes::new()))
                .expect("write dummy");
            recorder
                .write_message(&Message::parse_message(Header::new(ids::PING_RESULT, 1, 0, 1, 0), Bytes::new()))
                .expect("write ping");
        }
        let mut reader = FileReader::open(&path).expect("open");
        let ping = reader.read_next_ping().expect("read").expect("some");
        assert_eq!(ping.message_id(), ids::PING_RESULT);
    }
}
