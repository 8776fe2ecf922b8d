//! Binary frame codec for the V3 podcast streaming endpoint.
//!
//! Frame layout:
//! - Header (4 bytes):
//!   - (4bits) version + (4bits) header_size
//!   - (4bits) message_type + (4bits) message_type_flags
//!   - (4bits) serialization + (4bits) compression
//!   - (8bits) reserved
//!
//! - Body, in order:
//!   - [optional] sequence (4 bytes), sequence flags on non-error frames
//!   - [optional] error code (4 bytes), error frames only
//!   - [optional] event (4 bytes), `WithEvent` flag
//!   - [optional] session_id (4 bytes len + data), session-level events
//!   - [optional] connect_id (4 bytes len + data), connection acknowledgements
//!   - payload_size (4 bytes) + payload_data

use std::fmt;
use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

// ================== Protocol Constants ==================

const PROTOCOL_VERSION: u8 = 0b0001;
const HEADER_WORDS: u8 = 1;

/// Message type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    #[default]
    FullClientRequest = 0b0001,
    AudioOnlyClient = 0b0010,
    FullServerResponse = 0b1001,
    AudioOnlyServer = 0b1011,
    FrontEndResultServer = 0b1100,
    Error = 0b1111,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0b0001 => Ok(MessageType::FullClientRequest),
            0b0010 => Ok(MessageType::AudioOnlyClient),
            0b1001 => Ok(MessageType::FullServerResponse),
            0b1011 => Ok(MessageType::AudioOnlyServer),
            0b1100 => Ok(MessageType::FrontEndResultServer),
            0b1111 => Ok(MessageType::Error),
            other => Err(Error::Decode(format!("unknown message type {:#06b}", other))),
        }
    }
}

/// Message type flags.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFlags {
    #[default]
    NoSequence = 0b0000,
    PositiveSequence = 0b0001,
    LastNoSequence = 0b0010,
    NegativeSequence = 0b0011,
    WithEvent = 0b0100,
}

impl TryFrom<u8> for MessageFlags {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0b0000 => Ok(MessageFlags::NoSequence),
            0b0001 => Ok(MessageFlags::PositiveSequence),
            0b0010 => Ok(MessageFlags::LastNoSequence),
            0b0011 => Ok(MessageFlags::NegativeSequence),
            0b0100 => Ok(MessageFlags::WithEvent),
            other => Err(Error::Decode(format!("unknown message flags {:#06b}", other))),
        }
    }
}

impl MessageFlags {
    fn has_sequence(self) -> bool {
        matches!(
            self,
            MessageFlags::PositiveSequence | MessageFlags::NegativeSequence
        )
    }
}

/// Serialization type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationType {
    Raw = 0b0000,
    #[default]
    Json = 0b0001,
}

/// Compression type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None = 0b0000,
    Gzip = 0b0001,
}

/// Protocol event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    // Upstream (client -> server)
    StartConnection,
    FinishConnection,
    StartSession,
    CancelSession,
    FinishSession,

    // Downstream (server -> client)
    ConnectionStarted,
    ConnectionFailed,
    ConnectionFinished,
    SessionStarted,
    SessionCanceled,
    SessionFinished,
    SessionFailed,
    UsageResponse,
    PodcastRoundStart,
    PodcastRoundResponse,
    PodcastRoundEnd,
    PodcastEnd,

    /// An event number this client does not know.
    Unknown(i32),
}

impl EventType {
    /// Returns the wire number of the event.
    pub fn code(self) -> i32 {
        match self {
            EventType::StartConnection => 1,
            EventType::FinishConnection => 2,
            EventType::ConnectionStarted => 50,
            EventType::ConnectionFailed => 51,
            EventType::ConnectionFinished => 52,
            EventType::StartSession => 100,
            EventType::CancelSession => 101,
            EventType::FinishSession => 102,
            EventType::SessionStarted => 150,
            EventType::SessionCanceled => 151,
            EventType::SessionFinished => 152,
            EventType::SessionFailed => 153,
            EventType::UsageResponse => 154,
            EventType::PodcastRoundStart => 360,
            EventType::PodcastRoundResponse => 361,
            EventType::PodcastRoundEnd => 362,
            EventType::PodcastEnd => 363,
            EventType::Unknown(code) => code,
        }
    }

    /// Connection-level events carry no session id.
    pub fn is_connection_level(self) -> bool {
        matches!(
            self,
            EventType::StartConnection
                | EventType::FinishConnection
                | EventType::ConnectionStarted
                | EventType::ConnectionFailed
                | EventType::ConnectionFinished
        )
    }

    /// Server acknowledgements of connection events carry a connect id.
    pub fn carries_connect_id(self) -> bool {
        matches!(
            self,
            EventType::ConnectionStarted
                | EventType::ConnectionFailed
                | EventType::ConnectionFinished
        )
    }
}

impl From<i32> for EventType {
    fn from(v: i32) -> Self {
        match v {
            1 => EventType::StartConnection,
            2 => EventType::FinishConnection,
            50 => EventType::ConnectionStarted,
            51 => EventType::ConnectionFailed,
            52 => EventType::ConnectionFinished,
            100 => EventType::StartSession,
            101 => EventType::CancelSession,
            102 => EventType::FinishSession,
            150 => EventType::SessionStarted,
            151 => EventType::SessionCanceled,
            152 => EventType::SessionFinished,
            153 => EventType::SessionFailed,
            154 => EventType::UsageResponse,
            360 => EventType::PodcastRoundStart,
            361 => EventType::PodcastRoundResponse,
            362 => EventType::PodcastRoundEnd,
            363 => EventType::PodcastEnd,
            other => EventType::Unknown(other),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Unknown(code) => write!(f, "Unknown({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

// ================== Frame ==================

/// One protocol frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Message type.
    pub msg_type: MessageType,
    /// Message flags.
    pub flags: MessageFlags,
    /// Event (present when flags is `WithEvent`).
    pub event: Option<EventType>,
    /// Session ID (session-level events).
    pub session_id: String,
    /// Connect ID (connection acknowledgements).
    pub connect_id: String,
    /// Sequence number.
    pub sequence: i32,
    /// Error code (error frames).
    pub error_code: u32,
    /// Payload data.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a connection-level control frame with an empty JSON payload.
    pub fn control(event: EventType) -> Self {
        Self {
            msg_type: MessageType::FullClientRequest,
            flags: MessageFlags::WithEvent,
            event: Some(event),
            payload: b"{}".to_vec(),
            ..Default::default()
        }
    }

    /// Creates a session-level client frame.
    pub fn session(event: EventType, session_id: &str, payload: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::FullClientRequest,
            flags: MessageFlags::WithEvent,
            event: Some(event),
            session_id: session_id.to_string(),
            payload,
            ..Default::default()
        }
    }

    /// Creates a full server response frame.
    pub fn server_event(event: EventType, session_id: &str, payload: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::FullServerResponse,
            flags: MessageFlags::WithEvent,
            event: Some(event),
            session_id: session_id.to_string(),
            payload,
            ..Default::default()
        }
    }

    /// Creates an audio-only server frame carrying round audio.
    pub fn server_audio(session_id: &str, audio: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::AudioOnlyServer,
            flags: MessageFlags::WithEvent,
            event: Some(EventType::PodcastRoundResponse),
            session_id: session_id.to_string(),
            payload: audio,
            ..Default::default()
        }
    }

    /// Creates a server error frame.
    pub fn server_error(code: u32, message: &str) -> Self {
        Self {
            msg_type: MessageType::Error,
            flags: MessageFlags::NoSequence,
            error_code: code,
            payload: message.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    /// Returns true if this is an audio-only message.
    pub fn is_audio_only(&self) -> bool {
        matches!(
            self.msg_type,
            MessageType::AudioOnlyServer | MessageType::AudioOnlyClient
        )
    }

    /// Returns true if this is an error message.
    pub fn is_error(&self) -> bool {
        self.msg_type == MessageType::Error
    }

    /// Returns the event, or `Unknown(0)` for frames without one.
    pub fn event_or_unknown(&self) -> EventType {
        self.event.unwrap_or(EventType::Unknown(0))
    }

    /// Returns the payload as lossy UTF-8 text.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

// ================== Binary Protocol ==================

/// Binary protocol encoder/decoder.
#[derive(Debug, Clone, Default)]
pub struct BinaryProtocol {
    compression: CompressionType,
    serialization: SerializationType,
}

impl BinaryProtocol {
    /// Creates a new binary protocol handler (JSON, uncompressed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets compression type.
    pub fn set_compression(&mut self, compression: CompressionType) {
        self.compression = compression;
    }

    /// Marshals a frame to bytes.
    pub fn marshal(&self, frame: &Frame) -> Result<Vec<u8>> {
        let serialization = if frame.is_audio_only() {
            SerializationType::Raw
        } else {
            self.serialization
        };

        let mut buf = BytesMut::with_capacity(64 + frame.payload.len());

        buf.put_u8(PROTOCOL_VERSION << 4 | HEADER_WORDS);
        buf.put_u8((frame.msg_type as u8) << 4 | (frame.flags as u8));
        buf.put_u8((serialization as u8) << 4 | (self.compression as u8));
        buf.put_u8(0x00);

        if frame.msg_type == MessageType::Error {
            buf.put_u32(frame.error_code);
        } else if frame.flags.has_sequence() {
            buf.put_i32(frame.sequence);
        }

        if frame.flags == MessageFlags::WithEvent {
            let event = frame
                .event
                .ok_or_else(|| Error::Decode("WithEvent frame has no event".to_string()))?;
            buf.put_i32(event.code());

            if !event.is_connection_level() {
                put_string(&mut buf, &frame.session_id);
            }
            if event.carries_connect_id() {
                put_string(&mut buf, &frame.connect_id);
            }
        }

        let payload = if self.compression == CompressionType::Gzip && !frame.payload.is_empty() {
            gzip_compress(&frame.payload)?
        } else {
            frame.payload.clone()
        };

        buf.put_u32(payload.len() as u32);
        buf.put_slice(&payload);

        Ok(buf.to_vec())
    }

    /// Unmarshals bytes to a frame.
    pub fn unmarshal(&self, data: &[u8]) -> Result<Frame> {
        let mut cursor = data;
        need(&cursor, 4, "header")?;

        let version_and_size = cursor.get_u8();
        let type_and_flags = cursor.get_u8();
        let ser_and_comp = cursor.get_u8();
        let _reserved = cursor.get_u8();

        let mut frame = Frame {
            msg_type: MessageType::try_from(type_and_flags >> 4)?,
            flags: MessageFlags::try_from(type_and_flags & 0x0f)?,
            ..Default::default()
        };

        let compression = match ser_and_comp & 0x0f {
            0b0000 => CompressionType::None,
            0b0001 => CompressionType::Gzip,
            other => {
                return Err(Error::Decode(format!("unknown compression {:#06b}", other)));
            }
        };

        // Header size is counted in 4-byte words.
        let header_words = (version_and_size & 0x0f) as usize;
        if header_words == 0 {
            return Err(Error::Decode("header size is zero".to_string()));
        }
        let extra = (header_words - 1) * 4;
        need(&cursor, extra, "extended header")?;
        cursor.advance(extra);

        if frame.msg_type == MessageType::Error {
            need(&cursor, 4, "error code")?;
            frame.error_code = cursor.get_u32();
        } else if frame.flags.has_sequence() {
            need(&cursor, 4, "sequence")?;
            frame.sequence = cursor.get_i32();
        }

        if frame.flags == MessageFlags::WithEvent {
            need(&cursor, 4, "event")?;
            let event = EventType::from(cursor.get_i32());
            frame.event = Some(event);

            if !event.is_connection_level() {
                frame.session_id = get_string(&mut cursor, "session id")?;
            }
            if event.carries_connect_id() {
                frame.connect_id = get_string(&mut cursor, "connect id")?;
            }
        }

        need(&cursor, 4, "payload size")?;
        let payload_size = cursor.get_u32() as usize;
        need(&cursor, payload_size, "payload")?;
        let payload = cursor[..payload_size].to_vec();

        frame.payload = if compression == CompressionType::Gzip && !payload.is_empty() {
            gzip_decompress(&payload)?
        } else {
            payload
        };

        Ok(frame)
    }
}

fn need(cursor: &&[u8], n: usize, what: &str) -> Result<()> {
    if cursor.remaining() < n {
        return Err(Error::Decode(format!(
            "frame truncated reading {}: need {} bytes, have {}",
            what,
            n,
            cursor.remaining()
        )));
    }
    Ok(())
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(cursor: &mut &[u8], what: &str) -> Result<String> {
    need(cursor, 4, what)?;
    let len = cursor.get_u32() as usize;
    need(cursor, len, what)?;
    let s = std::str::from_utf8(&cursor[..len])
        .map_err(|e| Error::Decode(format!("{} is not utf-8: {}", what, e)))?
        .to_string();
    cursor.advance(len);
    Ok(s)
}

fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Decode(format!("gzip decompress: {}", e)))?;
    Ok(decompressed)
}
