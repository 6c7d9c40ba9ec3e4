//! Fixed-capacity, NUL-padded names.
//!
//! Element names, table titles and channel names all live in fixed-width
//! byte slots. [`FixedName`] stores the bytes inline, compares by value and
//! hashes like any other key.

use std::borrow::Cow;
use std::fmt;

use crate::element::MAX_NAME_LEN;

/// A name of at most `N` bytes, padded with NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixedName<const N: usize> {
    bytes: [u8; N],
}

/// Element name: up to 15 bytes, stored in a 16-byte slot.
pub type ElementName = FixedName<MAX_NAME_LEN>;

/// Table title: stored in name slot 0, same width as element names.
pub type TableTitle = FixedName<MAX_NAME_LEN>;

/// Channel (queue) name: up to 8 bytes, the width of the frame sender field.
pub type ChannelName = FixedName<8>;

impl<const N: usize> FixedName<N> {
    /// Maximum name length in bytes.
    pub const CAPACITY: usize = N;

    /// The empty name. Only valid as a placeholder (for example "no sender yet").
    pub const fn empty() -> Self {
        Self { bytes: [0; N] }
    }

    /// Validate and store `name`.
    ///
    /// Rejects empty names, names longer than `N` bytes, and names containing
    /// NUL or `/` (names end up in kernel object paths).
    pub fn new(name: &str) -> Result<Self, NameError> {
        if name.len() > Self::CAPACITY {
            return Err(NameError::TooLong {
                len: name.len(),
                max: Self::CAPACITY,
            });
        }
        Self::truncating(name)
    }

    /// Like [`FixedName::new`], but cuts overlong names down to the last char
    /// boundary that fits.
    pub fn truncating(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.bytes().any(|b| b == 0 || b == b'/') {
            return Err(NameError::InvalidCharacter);
        }

        let mut end = name.len().min(N);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Ok(Self { bytes })
    }

    /// Read a name from a raw slot, stopping at the first NUL or after `N`
    /// bytes. No validation: slots written by other processes are taken as-is.
    pub fn from_bytes(slot: &[u8]) -> Self {
        let len = slot
            .iter()
            .take(N)
            .position(|&b| b == 0)
            .unwrap_or(slot.len().min(N));
        let mut bytes = [0u8; N];
        bytes[..len].copy_from_slice(&slot[..len]);
        Self { bytes }
    }

    /// Length of the name in bytes.
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(N)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// The name bytes, without padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// The full padded storage.
    pub fn as_padded(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Write the name into `slot`, zero-filling the rest of it.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is shorter than the name.
    pub fn write_padded(&self, slot: &mut [u8]) {
        let name = self.as_bytes();
        assert!(slot.len() >= name.len(), "name slot too small");
        slot[..name.len()].copy_from_slice(name);
        slot[name.len()..].fill(0);
    }

    /// Whether `slot` (NUL-terminated or full) holds exactly this name.
    pub fn matches_slot(&self, slot: &[u8]) -> bool {
        let name = self.as_bytes();
        let stored = slot
            .iter()
            .position(|&b| b == 0)
            .map_or(slot, |end| &slot[..end]);
        stored == name
    }
}

impl<const N: usize> Default for FixedName<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Display for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> fmt::Debug for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl<const N: usize> TryFrom<&str> for FixedName<N> {
    type Error = NameError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

/// Why a name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong { len: usize, max: usize },
    /// The name contains NUL or `/`.
    InvalidCharacter,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name is empty"),
            Self::TooLong { len, max } => {
                write!(f, "name is {} bytes, max {}", len, max)
            }
            Self::InvalidCharacter => write!(f, "name contains NUL or '/'"),
        }
    }
}

impl std::error::Error for NameError {}
