use crate::Result;
use chrono::{DateTime, Local, TimeZone};
use core::net::SocketAddr;
use std::fmt;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, Decoder, Encoder};

pub const MAX_NAME_LEN: usize = 15;
pub const MAX_LINE_LEN: usize = 8 * 1024;
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall clock time at second resolution, already rendered for the wire.
#[derive(derive_more::Display, Clone, Debug, PartialEq, Eq)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn now() -> Self {
        Local::now().into()
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp
where
    Tz::Offset: fmt::Display,
{
    fn from(value: DateTime<Tz>) -> Self {
        Timestamp(value.format(TIME_FORMAT).to_string())
    }
}

#[derive(derive_more::Display, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

#[derive(derive_more::Display, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameError {
    #[display("name must not be blank")]
    Blank,
    #[display("name must be at most 15 characters")]
    TooLong,
}

impl Username {
    /// Trims surrounding whitespace, then checks the name is non-empty and
    /// at most [`MAX_NAME_LEN`] characters.
    pub fn parse(input: &str) -> core::result::Result<Username, NameError> {
        let name = input.trim();
        if name.is_empty() {
            return Err(NameError::Blank);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(NameError::TooLong);
        }
        Ok(Username(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

// every piece of text the server writes to a client
#[derive(derive_more::Display, Clone, Debug, PartialEq)]
pub enum OutgoingMessage {
    #[display("Welcome to TCP-Chat!\n")]
    Welcome,
    #[display("{}", _0)]
    Logo(String),
    #[display("\nRoom is full\n")]
    RoomFull,
    #[display("\n[ENTER YOUR NAME]: ")]
    EnterName,
    #[display("\nIncorrect name\n")]
    IncorrectName,
    #[display("\nLen of name is too long. Enter the name equal to or less than fifteen symbols\n")]
    NameTooLong,
    #[display("\nName already taken\n")]
    NameTaken,
    #[display("{}", _0)]
    Replay(String),
    #[display("[{}][{}]: ", timestamp, name)]
    Prompt { timestamp: Timestamp, name: Username },
    #[display("\n{}\n", _0)]
    Announcement(String),
    #[display("\n[{}][{}]: {}\n", timestamp, from, text)]
    Chat {
        timestamp: Timestamp,
        from: Username,
        text: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Join,
    Message(String),
    Leave,
}

/// A join, chat line or leave, stamped with its position in the transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatEvent {
    pub kind: EventKind,
    pub name: Username,
    pub timestamp: Timestamp,
    pub address: SocketAddr,
    // transcript line number, 1-based; zero until recorded
    pub seq: u64,
}

impl ChatEvent {
    pub fn join(name: Username, timestamp: Timestamp, address: SocketAddr) -> Self {
        Self::new(EventKind::Join, name, timestamp, address)
    }

    pub fn message(
        name: Username,
        timestamp: Timestamp,
        address: SocketAddr,
        text: String,
    ) -> Self {
        Self::new(EventKind::Message(text), name, timestamp, address)
    }

    pub fn leave(name: Username, timestamp: Timestamp, address: SocketAddr) -> Self {
        Self::new(EventKind::Leave, name, timestamp, address)
    }

    fn new(kind: EventKind, name: Username, timestamp: Timestamp, address: SocketAddr) -> Self {
        Self {
            kind,
            name,
            timestamp,
            address,
            seq: 0,
        }
    }

    pub fn text(&self) -> String {
        match &self.kind {
            EventKind::Join => format!("{} has joined our chat...", self.name),
            EventKind::Message(text) => text.clone(),
            EventKind::Leave => format!("{} has left our chat...", self.name),
        }
    }

    pub fn transcript_line(&self) -> String {
        match &self.kind {
            EventKind::Message(text) => format!("[{}][{}]: {}\n", self.timestamp, self.name, text),
            _ => format!("{}\n", self.text()),
        }
    }

    /// What the other clients see for this event, before their own prompt.
    pub fn broadcast(&self) -> OutgoingMessage {
        match &self.kind {
            EventKind::Message(text) => OutgoingMessage::Chat {
                timestamp: self.timestamp.clone(),
                from: self.name.clone(),
                text: text.clone(),
            },
            _ => OutgoingMessage::Announcement(self.text()),
        }
    }

    /// Leaves go to everyone still registered; joins and chat skip the sender.
    pub fn reaches_sender(&self) -> bool {
        matches!(self.kind, EventKind::Leave)
    }
}

/// Newline framed text. Bytes that are not UTF-8 are replaced rather than
/// treated as a broken connection.
pub struct ChatCodec {
    lines: AnyDelimiterCodec,
}

impl ChatCodec {
    pub fn new() -> Self {
        Self {
            lines: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), vec![], MAX_LINE_LEN),
        }
    }
}

fn to_line(chunk: Bytes) -> String {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
    String::from_utf8_lossy(chunk).into_owned()
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

// Prompts must not gain a trailing newline, so the text goes out verbatim.
impl Encoder<OutgoingMessage> for ChatCodec {
    type Error = crate::Error;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(item.to_string().as_bytes());
        Ok(())
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.lines.decode(src)?.map(to_line))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.lines.decode_eof(src)?.map(to_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::Utc;

    fn stamp() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap().into()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn timestamp_uses_second_resolution() {
        assert_eq!(stamp().to_string(), "2024-03-09 07:05:01");
    }

    #[test]
    fn username_is_trimmed() {
        assert_eq!(Username::parse("  alice \n").unwrap().as_str(), "alice");
    }

    #[test]
    fn blank_names_are_rejected() {
        for blank in ["", " ", "\t  ", "\n"] {
            assert_eq!(Username::parse(blank), Err(NameError::Blank));
        }
    }

    #[test]
    fn name_length_limit_counts_characters() {
        assert!(Username::parse("abcdefghijklmno").is_ok());
        assert_eq!(Username::parse("abcdefghijklmnop"), Err(NameError::TooLong));
        // multibyte characters count once
        assert!(Username::parse("ééééééééééééééé").is_ok());
    }

    #[test]
    fn names_are_case_sensitive() {
        assert_ne!(Username::parse("Alice"), Username::parse("alice"));
    }

    #[test]
    fn event_lines() {
        let alice = Username::parse("alice").unwrap();

        let join = ChatEvent::join(alice.clone(), stamp(), addr());
        assert_eq!(join.transcript_line(), "alice has joined our chat...\n");
        assert_eq!(
            join.broadcast().to_string(),
            "\nalice has joined our chat...\n"
        );

        let chat = ChatEvent::message(alice.clone(), stamp(), addr(), "hi".into());
        assert_eq!(chat.transcript_line(), "[2024-03-09 07:05:01][alice]: hi\n");
        assert_eq!(
            chat.broadcast().to_string(),
            "\n[2024-03-09 07:05:01][alice]: hi\n"
        );

        let leave = ChatEvent::leave(alice, stamp(), addr());
        assert_eq!(leave.transcript_line(), "alice has left our chat...\n");
        assert!(leave.reaches_sender());
        assert!(!chat.reaches_sender());
    }

    #[test]
    fn prompt_has_no_trailing_newline() {
        let prompt = OutgoingMessage::Prompt {
            timestamp: stamp(),
            name: Username::parse("bob").unwrap(),
        };
        assert_eq!(prompt.to_string(), "[2024-03-09 07:05:01][bob]: ");
    }

    #[test]
    fn codec_encodes_verbatim_and_splits_lines() {
        let mut codec = ChatCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(OutgoingMessage::EnterName, &mut buf).unwrap();
        assert_eq!(&buf[..], b"\n[ENTER YOUR NAME]: ");

        let mut input = BytesMut::from("alice\r\nhel");
        assert_eq!(codec.decode(&mut input).unwrap(), Some("alice".to_string()));
        assert_eq!(codec.decode(&mut input).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut input).unwrap(), Some("hel".to_string()));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let mut codec = ChatCodec::new();
        let mut input = BytesMut::from(&b"caf\xe9\r\nnext\n"[..]);
        assert_eq!(codec.decode(&mut input).unwrap(), Some("caf\u{FFFD}".to_string()));
        assert_eq!(codec.decode(&mut input).unwrap(), Some("next".to_string()));
    }

    #[test]
    fn overlong_line_is_an_error() {
        let mut codec = ChatCodec::new();
        let mut input = BytesMut::from(vec![b'a'; MAX_LINE_LEN + 1].as_slice());
        assert!(matches!(codec.decode(&mut input), Err(Error::Codec(_))));
    }
}
