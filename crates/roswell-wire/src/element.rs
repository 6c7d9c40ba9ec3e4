//! Shared element table layout definitions.
//!
//! # Memory Layout
//!
//! ```text
//! +-------------------------------------------------------------------+
//! | HEADER ARRAY (capacity x 4 bytes)                                 |
//! |   slot 0: TableControl { count, lock, next_offset }               |
//! |   slot n: ElementHeader { offset, size }                          |
//! +-------------------------------------------------------------------+
//! | NAME ARRAY (capacity x 16 bytes)                                  |
//! |   slot 0: table title, slot n: element name (NUL-padded)          |
//! +-------------------------------------------------------------------+
//! | DATA AREA (64 KiB)                                                |
//! |   lower half 0x0000..0x8000, mirror half 0x8000..0x10000          |
//! +-------------------------------------------------------------------+
//! ```
//!
//! Slot 0 of the header array was historically a packed pair of `u16`s: the
//! low word held `count | lock << 8` and the high word the allocation
//! pointer. [`TableControl`] spells those bytes out as separate fields; on a
//! little-endian host the two forms are byte-identical.

use std::sync::atomic::{AtomicU8, AtomicU16};

use static_assertions::const_assert_eq;

// =============================================================================
// Constants
// =============================================================================

/// Maximum header slots (including the control slot).
pub const MAX_ELEMENTS: usize = 256;

/// Highest element ID a table can hand out (the count is one byte).
pub const MAX_ELEMENT_ID: u16 = 255;

/// Width of one name slot.
pub const NAME_SLOT_LEN: usize = 16;

/// Longest element name or title (one byte stays NUL).
pub const MAX_NAME_LEN: usize = NAME_SLOT_LEN - 1;

/// Size of the whole data area, both halves.
pub const DATA_AREA_LEN: usize = 0x10000;

/// Size of one mirror half; all allocations must fit in it.
pub const DATA_HALF_LEN: usize = DATA_AREA_LEN / 2;

/// Bytes reserved for a bounded-string element.
pub const STRING_RESERVED: u16 = 64;

/// Longest string a bounded-string element can hold (one byte stays NUL).
pub const MAX_STRING_LEN: usize = STRING_RESERVED as usize - 1;

/// Largest fixed element size.
pub const MAX_ELEMENT_SIZE: u16 = 0x7FFF;

/// Wire size value meaning "bounded string".
pub const STRING_WIRE_SIZE: u16 = 0;

/// Title used when none (or an empty one) is configured.
pub const DEFAULT_TITLE: &str = "Roswell";

// =============================================================================
// Header slots
// =============================================================================

/// Header slot for one published element (4 bytes).
#[repr(C)]
pub struct ElementHeader {
    /// Data-area offset of the currently published copy. Bit 15 selects the
    /// mirror half.
    pub offset: AtomicU16,
    /// Wire size: payload bytes, or 0 for a bounded string.
    pub size: AtomicU16,
}

const_assert_eq!(core::mem::size_of::<ElementHeader>(), 4);

/// Header slot 0: table-wide bookkeeping (4 bytes).
#[repr(C)]
pub struct TableControl {
    /// Number of registered elements (IDs `1..=count` are valid).
    pub count: AtomicU8,
    /// Structural lock byte, `0xFF` while held.
    pub lock: AtomicU8,
    /// Next free byte in the lower data half.
    pub next_offset: AtomicU16,
}

const_assert_eq!(core::mem::size_of::<TableControl>(), 4);
const_assert_eq!(
    core::mem::size_of::<TableControl>(),
    core::mem::size_of::<ElementHeader>()
);

// =============================================================================
// Element kinds
// =============================================================================

/// What an element stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Exactly this many bytes, 1..=32767.
    Fixed(u16),
    /// A NUL-terminated string of at most 63 bytes in a 64-byte reservation.
    BoundedString,
}

impl ElementKind {
    /// A fixed-size kind, if `size` is in range.
    pub const fn fixed(size: u16) -> Option<Self> {
        if size == 0 || size > MAX_ELEMENT_SIZE {
            None
        } else {
            Some(Self::Fixed(size))
        }
    }

    /// Fixed kind sized for `T`.
    pub const fn of<T>() -> Option<Self> {
        let size = core::mem::size_of::<T>();
        if size > MAX_ELEMENT_SIZE as usize {
            None
        } else {
            Self::fixed(size as u16)
        }
    }

    /// Whether this kind survives a round trip through the header `size`
    /// field. `Fixed(0)` would read back as a string and `Fixed(0x8000)` not
    /// at all.
    pub const fn is_valid(self) -> bool {
        match self {
            Self::Fixed(size) => size != 0 && size <= MAX_ELEMENT_SIZE,
            Self::BoundedString => true,
        }
    }

    /// Decode the size stored in a header slot.
    pub const fn from_wire_size(size: u16) -> Option<Self> {
        if size == STRING_WIRE_SIZE {
            Some(Self::BoundedString)
        } else {
            Self::fixed(size)
        }
    }

    /// Value stored in the header `size` field.
    pub const fn wire_size(self) -> u16 {
        match self {
            Self::Fixed(size) => size,
            Self::BoundedString => STRING_WIRE_SIZE,
        }
    }

    /// Bytes this kind occupies in each data half.
    pub const fn reserved_bytes(self) -> u16 {
        match self {
            Self::Fixed(size) => size,
            Self::BoundedString => STRING_RESERVED,
        }
    }

    pub const fn is_string(self) -> bool {
        matches!(self, Self::BoundedString)
    }

    /// Whether a request for `self` can reuse an element registered as
    /// `stored`: same category, and no larger.
    pub const fn fits_within(self, stored: ElementKind) -> bool {
        match (self, stored) {
            (Self::Fixed(want), Self::Fixed(have)) => want <= have,
            (Self::BoundedString, Self::BoundedString) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "fixed({} bytes)", size),
            Self::BoundedString => write!(f, "string(max {} bytes)", MAX_STRING_LEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_size_zero_is_string() {
        assert_eq!(
            ElementKind::from_wire_size(0),
            Some(ElementKind::BoundedString)
        );
        assert_eq!(ElementKind::from_wire_size(8), Some(ElementKind::Fixed(8)));
        assert_eq!(ElementKind::from_wire_size(0x8000), None);
        assert_eq!(ElementKind::BoundedString.wire_size(), 0);
        assert_eq!(ElementKind::BoundedString.reserved_bytes(), 64);
    }

    #[test]
    fn only_encodable_kinds_are_valid() {
        assert!(ElementKind::BoundedString.is_valid());
        assert!(ElementKind::Fixed(1).is_valid());
        assert!(ElementKind::Fixed(MAX_ELEMENT_SIZE).is_valid());
        assert!(!ElementKind::Fixed(0).is_valid());
        assert!(!ElementKind::Fixed(0x8000).is_valid());
        for size in [0u16, 1, 8, 0x7FFF, 0x8000, u16::MAX] {
            let kind = ElementKind::Fixed(size);
            assert_eq!(
                kind.is_valid(),
                ElementKind::from_wire_size(kind.wire_size()) == Some(kind)
            );
        }
    }

    #[test]
    fn of_uses_type_size() {
        assert_eq!(ElementKind::of::<f64>(), Some(ElementKind::Fixed(8)));
        assert_eq!(ElementKind::of::<()>(), None);
        assert_eq!(ElementKind::of::<[u8; 40000]>(), None);
    }

    #[test]
    fn reuse_requires_same_category() {
        let double = ElementKind::Fixed(8);
        assert!(ElementKind::Fixed(4).fits_within(double));
        assert!(ElementKind::Fixed(8).fits_within(double));
        assert!(!ElementKind::Fixed(16).fits_within(double));
        assert!(!ElementKind::BoundedString.fits_within(ElementKind::Fixed(64)));
        assert!(!ElementKind::Fixed(4).fits_within(ElementKind::BoundedString));
        assert!(ElementKind::BoundedString.fits_within(ElementKind::BoundedString));
    }

    #[test]
    fn control_word_matches_packed_form() {
        // count = 3, lock = 0xFF, next_offset = 0x0140 as a packed little-endian
        // pair of u16s: low word 0xFF03, high word 0x0140.
        let packed: u32 = 0x0140_FF03;
        let bytes = packed.to_le_bytes();
        assert_eq!(bytes, [0x03, 0xFF, 0x40, 0x01]);
        assert_eq!(core::mem::offset_of!(TableControl, count), 0);
        assert_eq!(core::mem::offset_of!(TableControl, lock), 1);
        assert_eq!(core::mem::offset_of!(TableControl, next_offset), 2);
    }
}
