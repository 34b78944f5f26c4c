//! Binary frame codec for the streaming TTS protocol.
//!
//! ```text
//! ┌─────────────┬─────────────┬─────────────┬──────────┬────────────┬────────────┬─────────┐
//! │ ver │ hsize │ type │ flags│ ser  │ comp │ reserved │ event code │ payload N  │ payload │
//! │ 4b  │ 4b    │ 4b   │ 4b   │ 4b   │ 4b   │ 1 byte   │ u32 BE     │ u32 BE     │ N bytes │
//! └─────────────┴─────────────┴─────────────┴──────────┴────────────┴────────────┴─────────┘
//! ```
//!
//! All multi-byte integers are big-endian.

use crate::error::{Result, VolcError};

/// Protocol version carried in the high nibble of byte 0.
pub const PROTOCOL_VERSION: u8 = 0b0001;

/// Header size in 4-byte units, low nibble of byte 0.
pub const HEADER_SIZE_UNITS: u8 = 0b0001;

/// Fixed header (4) + event code (4) + payload length (4).
pub const MIN_FRAME_LEN: usize = 12;

/// Offset of the payload within a frame.
const PAYLOAD_OFFSET: usize = 12;

/// Flag bit marking that an event code follows the header.
pub const FLAG_WITH_EVENT: u8 = 0b0100;

/// Message type nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Client request carrying text (full client request).
    SendText,
    /// Server response carrying JSON metadata.
    FullServerResponse,
    /// Server response carrying audio bytes.
    AudioOnlyResponse,
    /// Server error frame; the event-code slot holds the error code.
    Error,
    Other(u8),
}

impl MessageType {
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            0b0001 => Self::SendText,
            0b1001 => Self::FullServerResponse,
            0b1011 => Self::AudioOnlyResponse,
            0b1111 => Self::Error,
            other => Self::Other(other),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Self::SendText => 0b0001,
            Self::FullServerResponse => 0b1001,
            Self::AudioOnlyResponse => 0b1011,
            Self::Error => 0b1111,
            Self::Other(v) => v & 0x0F,
        }
    }
}

/// Payload serialization nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    Raw,
    Json,
    Other(u8),
}

impl Serialization {
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            0b0000 => Self::Raw,
            0b0001 => Self::Json,
            other => Self::Other(other),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Self::Raw => 0b0000,
            Self::Json => 0b0001,
            Self::Other(v) => v & 0x0F,
        }
    }
}

/// Payload compression nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Other(u8),
}

impl Compression {
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            0b0000 => Self::None,
            0b0001 => Self::Gzip,
            other => Self::Other(other),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Self::None => 0b0000,
            Self::Gzip => 0b0001,
            Self::Other(v) => v & 0x0F,
        }
    }
}

/// Event codes used by the unidirectional TTS stream.
pub mod event {
    pub const SESSION_FINISHED: u32 = 152;
    pub const SESSION_FAILED: u32 = 153;
    pub const TTS_SENTENCE_START: u32 = 350;
    pub const TTS_SENTENCE_END: u32 = 351;
    pub const TTS_RESPONSE: u32 = 352;
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub header_size: u8,
    pub message_type: MessageType,
    pub flags: u8,
    pub serialization: Serialization,
    pub compression: Compression,
    pub event_code: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    #[inline]
    pub fn has_event(&self) -> bool {
        self.flags & FLAG_WITH_EVENT != 0
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }
}

/// Encode an outgoing frame. The event flag is always set.
pub fn encode(
    message_type: MessageType,
    serialization: Serialization,
    compression: Compression,
    event_code: u32,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        VolcError::InvalidArgument(format!(
            "Frame payload of {} bytes exceeds u32 length field",
            payload.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(PAYLOAD_OFFSET + payload.len());
    buf.push((PROTOCOL_VERSION << 4) | HEADER_SIZE_UNITS);
    buf.push((message_type.nibble() << 4) | FLAG_WITH_EVENT);
    buf.push((serialization.nibble() << 4) | compression.nibble());
    buf.push(0);
    buf.extend_from_slice(&event_code.to_be_bytes());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode an incoming frame.
///
/// The declared payload length must match the bytes actually received;
/// trailing or missing bytes are both rejected.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(VolcError::FrameTooShort {
            len: bytes.len(),
            min: MIN_FRAME_LEN,
        });
    }

    let event_code = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let declared = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let actual = bytes.len() - PAYLOAD_OFFSET;
    if declared != actual {
        return Err(VolcError::MalformedFrame(format!(
            "declared payload length {declared} but received {actual} bytes"
        )));
    }

    Ok(Frame {
        version: bytes[0] >> 4,
        header_size: bytes[0] & 0x0F,
        message_type: MessageType::from_nibble(bytes[1] >> 4),
        flags: bytes[1] & 0x0F,
        serialization: Serialization::from_nibble(bytes[2] >> 4),
        compression: Compression::from_nibble(bytes[2] & 0x0F),
        event_code,
        payload: bytes[PAYLOAD_OFFSET..].to_vec(),
    })
}
