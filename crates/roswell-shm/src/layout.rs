//! Offsets of the three table sections for a given capacity.

use roswell_wire::element::{DATA_AREA_LEN, MAX_ELEMENTS, NAME_SLOT_LEN};
use roswell_wire::{ElementHeader, TableControl};

use crate::ShmError;

const HEADER_SLOT_LEN: usize = core::mem::size_of::<ElementHeader>();
const SLOT_PAIR_LEN: usize = HEADER_SLOT_LEN + NAME_SLOT_LEN;

const _: () = assert!(core::mem::size_of::<TableControl>() == HEADER_SLOT_LEN);

/// Offsets within a table segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOffsets {
    /// Number of header slots, including the control slot.
    pub capacity: usize,
    pub headers: usize,
    pub names: usize,
    pub data: usize,
    /// Size of the whole segment.
    pub total: usize,
}

impl TableOffsets {
    /// Calculate offsets for a table with `capacity` header slots (1..=256).
    pub fn calculate(capacity: usize) -> Result<Self, ShmError> {
        if capacity == 0 || capacity > MAX_ELEMENTS {
            return Err(ShmError::Layout("capacity must be 1..=256"));
        }

        let headers = 0usize;
        let names = headers
            .checked_add(HEADER_SLOT_LEN * capacity)
            .ok_or(ShmError::Layout("name array offset overflow"))?;
        let data = names
            .checked_add(NAME_SLOT_LEN * capacity)
            .ok_or(ShmError::Layout("data area offset overflow"))?;
        let total = data
            .checked_add(DATA_AREA_LEN)
            .ok_or(ShmError::Layout("segment size overflow"))?;

        Ok(Self {
            capacity,
            headers,
            names,
            data,
            total,
        })
    }

    /// Recover the capacity of an existing segment from its size.
    pub fn capacity_from_size(size: usize) -> Option<usize> {
        let slots = size.checked_sub(DATA_AREA_LEN)?;
        if slots % SLOT_PAIR_LEN != 0 {
            return None;
        }
        let capacity = slots / SLOT_PAIR_LEN;
        (1..=MAX_ELEMENTS).contains(&capacity).then_some(capacity)
    }

    #[inline]
    pub fn header(&self, id: u16) -> usize {
        self.headers + HEADER_SLOT_LEN * id as usize
    }

    #[inline]
    pub fn name_slot(&self, id: u16) -> usize {
        self.names + NAME_SLOT_LEN * id as usize
    }

    /// Segment offset of a data-area offset (either half).
    #[inline]
    pub fn data(&self, offset: u16) -> usize {
        self.data + offset as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_table_layout() {
        let offsets = TableOffsets::calculate(256).unwrap();
        assert_eq!(offsets.names, 1024);
        assert_eq!(offsets.data, 1024 + 4096);
        assert_eq!(offsets.total, 1024 + 4096 + 65536);
        assert_eq!(offsets.header(3), 12);
        assert_eq!(offsets.name_slot(3), 1024 + 48);
        assert_eq!(offsets.data(0x8010), 5120 + 0x8010);
    }

    #[test]
    fn capacity_round_trips_through_size() {
        for capacity in [1, 16, 255, 256] {
            let offsets = TableOffsets::calculate(capacity).unwrap();
            assert_eq!(TableOffsets::capacity_from_size(offsets.total), Some(capacity));
        }
        assert_eq!(TableOffsets::capacity_from_size(DATA_AREA_LEN), None);
        assert_eq!(TableOffsets::capacity_from_size(DATA_AREA_LEN + 21), None);
        assert_eq!(TableOffsets::capacity_from_size(100), None);
    }

    #[test]
    fn capacity_is_bounded() {
        assert!(TableOffsets::calculate(0).is_err());
        assert!(TableOffsets::calculate(257).is_err());
    }
}
