//! [`Message`]: a header paired with its payload bytes and the instant it
//! was received.

use std::time::SystemTime;

use bytes::Bytes;

use crate::{header::Header, ids};

/// A complete wire message: header plus payload, stamped with the local
/// receive time.
///
/// `parse_message` binds header and payload as-is; it does not check
/// `data.len() == header.payload_size()`. Transport layers that read exactly
/// `payload_size` bytes off the wire uphold that invariant by construction.
/// Callers that build a `Message` from an untrusted source should check it
/// themselves via [`Message::payload_size_matches`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    header: Header,
    data: Bytes,
    timestamp: SystemTime,
}

impl Message {
    /// Binds a header to its payload bytes, stamping the current time.
    #[must_use]
    pub fn parse_message(header: Header, data: Bytes) -> Self {
        Self { header, data, timestamp: SystemTime::now() }
    }

    /// Binds a header to its payload bytes with an explicit timestamp, for
    /// replaying messages read back from a log file.
    #[must_use]
    pub fn with_timestamp(header: Header, data: Bytes, timestamp: SystemTime) -> Self {
        Self { header, data, timestamp }
    }

    /// The header of this record.
    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }

    /// The payload bytes.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Local time the message was bound to its header.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Message type id, from the header.
    #[must_use]
    pub fn message_id(&self) -> u16 {
        self.header.msg_id()
    }

    /// Message version, from the header.
    #[must_use]
    pub fn message_version(&self) -> u16 {
        self.header.msg_version()
    }

    /// Payload size as declared by the header.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        self.header.payload_size()
    }

    /// `true` iff the payload's actual length matches `header.payload_size()`.
    #[must_use]
    pub fn payload_size_matches(&self) -> bool {
        self.data.len() as u64 == u64::from(self.header.payload_size())
    }

    /// `true` iff this message carries a (v1 or legacy) ping result.
    #[must_use]
    pub fn is_ping_message(&self) -> bool {
        ids::is_ping_result_id(self.message_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message_binds_without_validating() {
        let header = Header::new(ids::PING_RESULT, 2, 0, 1, 100);
        let message = Message::parse_message(header, Bytes::from_static(b"short"));
        assert!(!message.payload_size_matches());
        assert_eq!(message.message_id(), ids::PING_RESULT);
    }

    #[test]
    fn is_ping_message_matches_ping_result_only() {
        let ping = Message::parse_message(Header::new(ids::PING_RESULT, 2, 0, 1, 0), Bytes::new());
        let dummy = Message::parse_message(Header::new(ids::DUMMY, 2, 0, 1, 0), Bytes::new());
        assert!(ping.is_ping_message());
        assert!(!dummy.is_ping_message());
    }

    #[test]
    fn with_timestamp_preserves_explicit_time() {
        let header = Header::new(ids::DUMMY, 1, 0, 1, 0);
        let stamp = SystemTime::UNIX_EPOCH;
        let message = Message::with_timestamp(header, Bytes::new(), stamp);
        assert_eq!(message.timestamp(), stamp);
    }
}
