//! Writes sonar traffic to a log file: one `OculusSonar` item per message,
//! paired with an `OculusSonarStamp` sidecar carrying the exact receive
//! time, so the sonar item itself stays a byte-for-byte copy of what the
//! sonar actually sent.

use std::{
    fs::File,
    io::{self, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use oculus_proto::{
    log::{LogFileHeader, LogItem, RECORD_TYPE_OCULUS_SONAR, RECORD_TYPE_OCULUS_SONAR_STAMP},
    Message, SonarStamp,
};
use zerocopy::IntoBytes;

/// Converts a [`SystemTime`] to seconds since the Unix epoch, saturating
/// at zero for times before it (the log format has no way to represent a
/// negative timestamp).
#[must_use]
pub fn to_log_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// An open log file being written to.
///
/// Blocking disk I/O on purpose, matching the original recorder: a sonar
/// message arrives at most a few hundred times a second, and buffered
/// writes to a local file don't warrant the complexity of an async
/// writer. Callers on an async reactor should drive this from
/// `tokio::task::spawn_blocking`.
pub struct Recorder {
    file: File,
}

impl Recorder {
    /// Creates a new log file at `path`, truncating it if it exists, and
    /// writes the file header stamped with the current time.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = File::create(path)?;
        let header = LogFileHeader::new(to_log_seconds(SystemTime::now()));
        file.write_all(header.as_bytes())?;
        Ok(Self { file })
    }

    /// Writes one message as a paired `OculusSonar` + `OculusSonarStamp`
    /// item. The first item's payload is an exact copy of the message's
    /// header and data; the second carries only the timestamp.
    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let time = to_log_seconds(message.timestamp());
        let header_bytes = message.header().to_bytes();
        let payload_len = header_bytes.len() + message.data().len();

        let sonar_item = LogItem::new(RECORD_TYPE_OCULUS_SONAR, time, payload_len as u32);
        self.file.write_all(sonar_item.as_bytes())?;
        self.file.write_all(&header_bytes)?;
        self.file.write_all(message.data())?;

        let stamp = SonarStamp::from_system_time(message.timestamp());
        let stamp_item = LogItem::new(RECORD_TYPE_OCULUS_SONAR_STAMP, time, SonarStamp::SIZE as u32);
        self.file.write_all(stamp_item.as_bytes())?;
        self.file.write_all(stamp.as_bytes())?;

        Ok(())
    }

    /// Flushes any buffered writes to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{io::Read, time::Duration};

    use bytes::Bytes;
    use oculus_proto::{ids, Header};

    use super::*;
    use crate::file_reader::FileReader;

    #[test]
    fn write_then_read_round_trips_a_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");

        let header = Header::new(ids::PING_RESULT, 1, 0, 1, 4);
        let message = Message::with_timestamp(
            header,
            Bytes::from_static(&[1, 2, 3, 4]),
            UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789),
        );

        {
            let mut recorder = Recorder::create(&path).expect("create");
            recorder.write_message(&message).expect("write");
            recorder.flush().expect("flush");
        }

        let mut reader = FileReader::open(&path).expect("open");
        let read_back = reader.read_next_message().expect("read").expect("some message");
        assert_eq!(read_back.message_id(), ids::PING_RESULT);
        assert_eq!(read_back.data().as_ref(), &[1, 2, 3, 4]);
        assert_eq!(read_back.timestamp(), message.timestamp());

        assert!(reader.read_next_message().expect("read eof").is_none());
    }

    #[test]
    fn file_header_is_written_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.oculus");
        Recorder::create(&path).expect("create");

        let mut file = File::open(&path).expect("open");
        let mut bytes = vec![0u8; LogFileHeader::SIZE];
        file.read_exact(&mut bytes).expect("read header");
        assert_eq!(&bytes[0..4], &oculus_proto::log::FILE_MAGIC.to_le_bytes());
    }
}
