//! Error categories shared by the table and channel crates.

use std::fmt;

/// Broad category of a failure, independent of which primitive raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A name, size, type or payload was malformed.
    InvalidArgument,
    /// A named element or channel does not exist.
    NotFound,
    /// A table, data area or channel directory is full.
    CapacityExceeded,
    /// The operation does not match the element's kind or size.
    TypeMismatch,
    /// An element ID or channel number is out of range.
    OutOfRange,
    /// The destination queue is full.
    Busy,
    /// A deadline passed.
    Timeout,
    /// Interrupted; trying again may succeed.
    Retryable,
    /// The operating system refused the operation.
    Fatal,
}

impl ErrorKind {
    /// Whether the caller can reasonably try the same operation again.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Busy | Self::Timeout | Self::Retryable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::CapacityExceeded => "capacity exceeded",
            Self::TypeMismatch => "type mismatch",
            Self::OutOfRange => "out of range",
            Self::Busy => "busy",
            Self::Timeout => "timed out",
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_kinds_are_recoverable() {
        assert!(ErrorKind::Busy.is_recoverable());
        assert!(ErrorKind::Timeout.is_recoverable());
        assert!(ErrorKind::Retryable.is_recoverable());
        assert!(!ErrorKind::Fatal.is_recoverable());
        assert!(!ErrorKind::NotFound.is_recoverable());
    }
}
