//! Message frames carried on channel queues.
//!
//! ```text
//! 0        8                12         14        16
//! +--------+----------------+----------+---------+------------------+
//! | sender | timestamp_usec | type     | len     | payload[len]     |
//! | [u8;8] | u32 LE         | u16 LE   | u16 LE  | len <= 1024      |
//! +--------+----------------+----------+---------+------------------+
//! ```

use std::fmt;

use crate::limits::{FRAME_HEADER_LEN, MAX_MESSAGE_LENGTH};
use crate::name::ChannelName;

/// Message type tag. Valid tags on the wire are 1..=255.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(u16);

impl MessageType {
    pub const NULL: Self = Self(0);
    pub const DATA: Self = Self(1);
    pub const QUERY: Self = Self(2);
    pub const LOG: Self = Self(3);
    pub const WATCHDOG: Self = Self(4);
    pub const DOWN: Self = Self(5);
    pub const COMMAND: Self = Self(6);
    pub const ONBOARD: Self = Self(11);
    pub const LIST: Self = Self(12);
    pub const UPDATE: Self = Self(13);

    /// A type that may be sent: 1..=255.
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 || raw > 255 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Wrap a tag read off the wire without validating it.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Whether this tag may be sent.
    pub const fn is_sendable(self) -> bool {
        self.0 != 0 && self.0 <= 255
    }

    /// Symbolic name for the well-known tags.
    pub const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "NULL",
            1 => "DATA",
            2 => "QUERY",
            3 => "LOG",
            4 => "WATCHDOG",
            5 => "DOWN",
            6 => "COMMAND",
            11 => "ONBOARD",
            12 => "LIST",
            13 => "UPDATE",
            _ => return None,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "type {}", self.0),
        }
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageType({})", self)
    }
}

/// Fixed part of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Channel name of the sending directory.
    pub sender: ChannelName,
    /// Microseconds within the current second when the frame was built.
    pub timestamp_usec: u32,
    pub kind: MessageType,
    /// Payload length in bytes.
    pub len: u16,
}

impl FrameHeader {
    /// Total encoded size of the frame this header describes.
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.len as usize
    }
}

/// Build a frame around `payload`.
pub fn encode_frame(
    sender: &ChannelName,
    timestamp_usec: u32,
    kind: MessageType,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_MESSAGE_LENGTH {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_MESSAGE_LENGTH,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(sender.as_padded());
    frame.extend_from_slice(&timestamp_usec.to_le_bytes());
    frame.extend_from_slice(&kind.raw().to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split a received frame into its header and payload.
///
/// Bytes past the declared payload length are ignored.
pub fn decode_frame(buf: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Err(FrameError::Truncated { len: buf.len() });
    }

    let sender = ChannelName::from_bytes(&buf[0..8]);
    let timestamp_usec = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let kind = MessageType::from_raw(u16::from_le_bytes([buf[12], buf[13]]));
    let len = u16::from_le_bytes([buf[14], buf[15]]);

    if len as usize > MAX_MESSAGE_LENGTH {
        return Err(FrameError::PayloadTooLarge {
            len: len as usize,
            max: MAX_MESSAGE_LENGTH,
        });
    }

    let end = FRAME_HEADER_LEN + len as usize;
    if buf.len() < end {
        return Err(FrameError::LengthMismatch {
            declared: len as usize,
            available: buf.len() - FRAME_HEADER_LEN,
        });
    }

    let header = FrameHeader {
        sender,
        timestamp_usec,
        kind,
        len,
    };
    Ok((header, &buf[FRAME_HEADER_LEN..end]))
}

/// Errors from frame encoding and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a frame header.
    Truncated { len: usize },
    /// The header claims more payload than was received.
    LengthMismatch { declared: usize, available: usize },
    /// Payload longer than the frame format allows.
    PayloadTooLarge { len: usize, max: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len } => {
                write!(f, "frame truncated: {} bytes, header needs {}", len, FRAME_HEADER_LEN)
            }
            Self::LengthMismatch {
                declared,
                available,
            } => write!(
                f,
                "frame declares {} payload bytes but carries {}",
                declared, available
            ),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload too large: {} bytes, max {}", len, max)
            }
        }
    }
}

impl std::error::Error for FrameError {}
