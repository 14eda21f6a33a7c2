//! Job payload envelope
//!
//! Every inbound job carries one frame:
//!
//! | offset | length | meaning                         |
//! |--------|--------|---------------------------------|
//! | 0      | 1      | category (`s`, `b`, `c`)        |
//! | 1      | 1      | event (`1`..=`5`)               |
//! | 2      | 36     | connection id, 7-bit ASCII      |
//! | 38     | rest   | payload (message events only)   |
//!
//! Outbound jobs carry no header; the destination identity is the routing key.

use bytes::{BufMut, Bytes, BytesMut};

/// Length of the connection identifier token
pub const CONNECTION_ID_LEN: usize = 36;

/// Category byte + event byte + connection id
pub const HEADER_LEN: usize = 2 + CONNECTION_ID_LEN;

/// Frame category marker (byte 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    String,
    Binary,
    Control,
}

impl Category {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b's' => Some(Self::String),
            b'b' => Some(Self::Binary),
            b'c' => Some(Self::Control),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::String => b's',
            Self::Binary => b'b',
            Self::Control => b'c',
        }
    }
}

/// Why a connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Intentional,
    Accidental,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intentional => f.write_str("intentional disconnect"),
            Self::Accidental => f.write_str("accidental disconnect"),
        }
    }
}

/// Connection state event (byte 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    Connect,
    StringMessage,
    BinaryMessage,
    DisconnectIntentional,
    DisconnectAccidental,
}

impl FrameEvent {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(Self::Connect),
            b'2' => Some(Self::StringMessage),
            b'3' => Some(Self::BinaryMessage),
            b'4' => Some(Self::DisconnectIntentional),
            b'5' => Some(Self::DisconnectAccidental),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Connect => b'1',
            Self::StringMessage => b'2',
            Self::BinaryMessage => b'3',
            Self::DisconnectIntentional => b'4',
            Self::DisconnectAccidental => b'5',
        }
    }

    pub fn is_message(self) -> bool {
        matches!(self, Self::StringMessage | Self::BinaryMessage)
    }

    pub fn disconnect_reason(self) -> Option<DisconnectReason> {
        match self {
            Self::DisconnectIntentional => Some(DisconnectReason::Intentional),
            Self::DisconnectAccidental => Some(DisconnectReason::Accidental),
            _ => None,
        }
    }
}

/// Reasons a job payload is ignored. None of these are reported as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("frame too short ({0} bytes, need {})", HEADER_LEN)]
    TooShort(usize),

    #[error("unknown category marker 0x{0:02x}")]
    UnknownCategory(u8),

    #[error("unknown event code 0x{0:02x}")]
    UnknownEvent(u8),
}

/// Errors building an inbound frame
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection id must be {} ASCII bytes, got {0:?}", CONNECTION_ID_LEN)]
    InvalidConnectionId(String),
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub category: Category,
    pub event: FrameEvent,
    pub connection_id: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(
        category: Category,
        event: FrameEvent,
        connection_id: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            category,
            event,
            connection_id: connection_id.into(),
            payload: payload.into(),
        }
    }

    /// Payload of a message event; `None` for control events and empty messages
    pub fn message_payload(&self) -> Option<&Bytes> {
        if self.event.is_message() && !self.payload.is_empty() {
            Some(&self.payload)
        } else {
            None
        }
    }

    /// Build the wire form of this frame
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        if self.connection_id.len() != CONNECTION_ID_LEN || !self.connection_id.is_ascii() {
            return Err(FrameError::InvalidConnectionId(self.connection_id.clone()));
        }

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.category.as_byte());
        buf.put_u8(self.event.as_byte());
        buf.put_slice(self.connection_id.as_bytes());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Decode a job payload. The returned payload shares the job's buffer.
pub fn decode(job: &Bytes) -> Result<Frame, DropReason> {
    if job.len() < HEADER_LEN {
        return Err(DropReason::TooShort(job.len()));
    }

    let category = Category::from_byte(job[0]).ok_or(DropReason::UnknownCategory(job[0]))?;
    let event = FrameEvent::from_byte(job[1]).ok_or(DropReason::UnknownEvent(job[1]))?;

    Ok(Frame {
        category,
        event,
        connection_id: decode_ascii(&job[2..HEADER_LEN]),
        payload: job.slice(HEADER_LEN..),
    })
}

/// 7-bit text decoding; bytes outside ASCII become `?`
fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// An outbound job: serialized payload keyed by destination identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundJob {
    pub destination: String,
    pub payload: Bytes,
}

/// Outbound encoding is a pass-through; no framing header is written.
pub fn encode(destination: impl Into<String>, payload: impl Into<Bytes>) -> OutboundJob {
    OutboundJob {
        destination: destination.into(),
        payload: payload.into(),
    }
}
