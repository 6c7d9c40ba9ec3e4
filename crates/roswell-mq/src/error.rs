use std::fmt;
use std::io;

use roswell_wire::{ChannelName, ErrorKind, FrameError, NameError};

/// Errors from channel directory operations.
#[derive(Debug)]
pub enum ChannelError {
    /// Channel name rejected.
    InvalidName(NameError),
    /// Message type outside 1..=255.
    InvalidType(u16),
    /// Payload longer than a frame can carry.
    PayloadTooLarge { len: usize, max: usize },
    /// Channel number past the end of the directory.
    OutOfRange { channel: usize, count: usize },
    /// Channel 0 was addressed before any message arrived.
    NoReplyTarget,
    /// No queue with this name exists.
    NotFound(ChannelName),
    /// The directory has no free entries.
    TableFull { capacity: usize },
    /// The destination queue is full.
    Busy,
    /// The deadline passed before the queue had room.
    Timeout,
    /// A signal interrupted the call.
    Interrupted,
    /// The queue descriptor is not valid for this operation.
    BadDescriptor,
    /// The kernel rejected the receive deadline.
    InvalidTimeout,
    /// The frame does not fit the queue's message size.
    FrameTooLarge,
    /// A received frame could not be decoded.
    Frame(FrameError),
    /// Any other I/O error.
    Io(io::Error),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_)
            | Self::InvalidType(_)
            | Self::PayloadTooLarge { .. }
            | Self::InvalidTimeout => ErrorKind::InvalidArgument,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::NoReplyTarget | Self::NotFound(_) => ErrorKind::NotFound,
            Self::TableFull { .. } => ErrorKind::CapacityExceeded,
            Self::Busy => ErrorKind::Busy,
            Self::Timeout => ErrorKind::Timeout,
            Self::Interrupted => ErrorKind::Retryable,
            Self::BadDescriptor | Self::FrameTooLarge | Self::Frame(_) | Self::Io(_) => {
                ErrorKind::Fatal
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }

    /// Classify an errno from `mq_timedsend`.
    pub(crate) fn from_send(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Self::Busy,
            Some(libc::EBADF) => Self::BadDescriptor,
            Some(libc::EINTR) => Self::Interrupted,
            Some(libc::EMSGSIZE) => Self::FrameTooLarge,
            Some(libc::ETIMEDOUT) => Self::Timeout,
            _ => Self::Io(err),
        }
    }

    /// Classify an errno from `mq_timedreceive`. Timeouts are not errors on
    /// the receive side and never reach here.
    pub(crate) fn from_receive(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EBADF) => Self::BadDescriptor,
            Some(libc::EINVAL) => Self::InvalidTimeout,
            Some(libc::EMSGSIZE) => Self::FrameTooLarge,
            Some(libc::EINTR) => Self::Interrupted,
            _ => Self::Io(err),
        }
    }

    /// Classify an errno from opening a queue to write to.
    pub(crate) fn from_open(err: io::Error, name: ChannelName) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOENT) => Self::NotFound(name),
            _ => Self::Io(err),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(e) => write!(f, "invalid channel name: {}", e),
            Self::InvalidType(t) => write!(f, "message type {} out of range (1..=255)", t),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload too large: {} bytes, max {}", len, max)
            }
            Self::OutOfRange { channel, count } => {
                write!(f, "channel {} out of range ({} channels)", channel, count)
            }
            Self::NoReplyTarget => write!(f, "no message received yet, nobody to reply to"),
            Self::NotFound(name) => write!(f, "channel {} not found", name),
            Self::TableFull { capacity } => {
                write!(f, "channel table full ({} entries)", capacity)
            }
            Self::Busy => write!(f, "queue full"),
            Self::Timeout => write!(f, "timed out"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::BadDescriptor => write!(f, "bad queue descriptor"),
            Self::InvalidTimeout => write!(f, "invalid timeout"),
            Self::FrameTooLarge => write!(f, "frame larger than the queue message size"),
            Self::Frame(e) => write!(f, "malformed frame: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidName(e) => Some(e),
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NameError> for ChannelError {
    fn from(e: NameError) -> Self {
        Self::InvalidName(e)
    }
}

impl From<FrameError> for ChannelError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::PayloadTooLarge { len, max } => Self::PayloadTooLarge { len, max },
            other => Self::Frame(other),
        }
    }
}
