#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

use std::fmt;

// Shared element table
pub use roswell_shm::{
    ElementId, ElementInfo, ElementKind, ElementName, SharedTable, ShmError, SpinPolicy,
    TableConfig, TableTitle, Written,
};

// Message channels
pub use roswell_mq::{
    ChannelConfig, ChannelDirectory, ChannelError, ChannelName, QueueAttributes, Received,
};

// Wire-level types
pub use roswell_wire::{ErrorKind, FrameHeader, MessageType, limits};

pub use bytemuck;

/// Either half of the library failed.
#[derive(Debug)]
pub enum Error {
    Shm(ShmError),
    Channel(ChannelError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Shm(e) => e.kind(),
            Self::Channel(e) => e.kind(),
        }
    }

    /// Busy, timed out or interrupted: trying again later may work.
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shm(e) => write!(f, "shared table: {}", e),
            Self::Channel(e) => write!(f, "channel: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Shm(e) => Some(e),
            Self::Channel(e) => Some(e),
        }
    }
}

impl From<ShmError> for Error {
    fn from(e: ShmError) -> Self {
        Self::Shm(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use roswell::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ChannelConfig, ChannelDirectory, ElementId, ElementKind, Error, ErrorKind, MessageType,
        Received, SharedTable, TableConfig,
    };
    pub use bytemuck::{Pod, Zeroable};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_pass_through() {
        let err: Error = ChannelError::Busy.into();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "channel: queue full");

        let err: Error = ShmError::TableFull { capacity: 256 }.into();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert!(!err.is_recoverable());
        assert!(std::error::Error::source(&err).is_some());
    }
}
