use std::fmt;
use std::io;

use roswell_wire::{ElementKind, ElementName, ErrorKind, NameError};

use crate::ElementId;

/// Errors from shared table operations.
#[derive(Debug)]
pub enum ShmError {
    /// Element name or table title rejected.
    InvalidName(NameError),
    /// A fixed size outside 1..=32767.
    SizeOutOfRange { size: u16 },
    /// The name is already registered with an incompatible kind or a smaller
    /// size.
    InvalidSize {
        name: ElementName,
        stored: ElementKind,
        requested: ElementKind,
    },
    /// Every header slot is taken.
    TableFull { capacity: usize },
    /// The data area has no room for another element of this size.
    DataAreaExhausted { requested: usize, available: usize },
    /// No element with this name.
    NotFound(ElementName),
    /// Element ID 0, or past the registered count.
    OutOfRange { id: u16, count: u16 },
    /// The access does not match the element's kind. `requested_len` is
    /// `None` for string access.
    TypeMismatch {
        id: ElementId,
        stored: ElementKind,
        requested_len: Option<usize>,
    },
    /// This instance never registered the element it tried to write.
    NotPublisher(ElementId),
    /// The caller's buffer cannot hold the element.
    BufferTooSmall { needed: usize, available: usize },
    /// Writes kept landing while the element was copied; no consistent copy
    /// was obtained.
    ReadContended(ElementId),
    /// The segment does not look like a table.
    Layout(&'static str),
    /// I/O error.
    Io(io::Error),
}

impl ShmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_)
            | Self::SizeOutOfRange { .. }
            | Self::InvalidSize { .. }
            | Self::NotPublisher(_)
            | Self::BufferTooSmall { .. } => ErrorKind::InvalidArgument,
            Self::TableFull { .. } | Self::DataAreaExhausted { .. } => ErrorKind::CapacityExceeded,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ReadContended(_) => ErrorKind::Retryable,
            Self::Layout(_) | Self::Io(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(e) => write!(f, "invalid name: {}", e),
            Self::SizeOutOfRange { size } => {
                write!(f, "element size {} out of range (fixed elements take 1..=32767)", size)
            }
            Self::InvalidSize {
                name,
                stored,
                requested,
            } => write!(
                f,
                "element {} already registered as {}, cannot reuse as {}",
                name, stored, requested
            ),
            Self::TableFull { capacity } => {
                write!(f, "element table full ({} slots)", capacity)
            }
            Self::DataAreaExhausted {
                requested,
                available,
            } => write!(
                f,
                "data area exhausted: need {} bytes, {} left",
                requested, available
            ),
            Self::NotFound(name) => write!(f, "element {} not found", name),
            Self::OutOfRange { id, count } => {
                write!(f, "element id {} out of range (1..={})", id, count)
            }
            Self::TypeMismatch {
                id,
                stored,
                requested_len: Some(len),
            } => write!(f, "element {} is {}, got {} bytes", id, stored, len),
            Self::TypeMismatch {
                id,
                stored,
                requested_len: None,
            } => write!(f, "element {} is {}, not a string", id, stored),
            Self::NotPublisher(id) => {
                write!(f, "element {} was not registered by this table instance", id)
            }
            Self::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: need {} bytes, got {}", needed, available)
            }
            Self::ReadContended(id) => {
                write!(f, "element {} kept changing while it was read", id)
            }
            Self::Layout(msg) => write!(f, "layout error: {}", msg),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidName(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NameError> for ShmError {
    fn from(e: NameError) -> Self {
        Self::InvalidName(e)
    }
}
