//! Ping-pong publication of a single-writer value.
//!
//! Every element owns two copies of its storage: one at its base offset in the
//! lower half of the data area, one at the same offset in the upper half. The
//! published offset names the copy readers should use. A writer fills the
//! other copy and then flips the published offset to point at it, so a reader
//! never observes a half-written value unless it is preempted for longer than
//! a full write cycle.
//!
//! A reader validates a copy in two ways. The published offset must be the
//! same before and after the copy, which catches a single flip. A writer that
//! laps the reader (A to B and back to A) leaves the offset unchanged, so a
//! copy is only accepted once a second validated copy agrees with it byte for
//! byte. The layout has no sequence counter to do better.

use crate::sync::{AtomicU16, Ordering, fence};

/// Bit distinguishing the upper mirror copy from the lower one.
pub const MIRROR_BIT: u16 = 0x8000;

/// Mask selecting the position of a copy within its half.
pub const OFFSET_MASK: u16 = 0x7FFF;

/// Offset of the other copy of the element stored at `offset`.
#[inline]
pub const fn mirror_of(offset: u16) -> u16 {
    offset ^ MIRROR_BIT
}

/// A view over the published-offset word of one element.
pub struct PingPong<'a> {
    published: &'a AtomicU16,
}

impl<'a> PingPong<'a> {
    #[inline]
    pub fn new(published: &'a AtomicU16) -> Self {
        Self { published }
    }

    /// Offset of the copy readers should currently use.
    #[inline]
    pub fn published(&self) -> u16 {
        self.published.load(Ordering::Acquire)
    }

    /// Offset of the copy a writer should fill next.
    #[inline]
    pub fn staging(&self) -> u16 {
        mirror_of(self.published())
    }

    /// Make `offset` the copy readers use.
    #[inline]
    pub fn publish(&self, offset: u16) {
        self.published.store(offset, Ordering::Release);
    }

    /// Fill the staging copy with `fill`, then publish it.
    ///
    /// Returns the newly published offset. Only one writer per element may
    /// call this at a time.
    pub fn write_with(&self, fill: impl FnOnce(u16)) -> u16 {
        let target = self.staging();
        fill(target);
        self.publish(target);
        target
    }

    /// Copy the published value into `out`.
    ///
    /// `copy(offset, dst)` must fill `dst` from the copy at `offset`.
    /// `scratch` must be as long as `out`. Returns `false` when `max_attempts`
    /// copies went by without two consecutive validated ones agreeing; `out`
    /// then holds nothing usable.
    pub fn read_consistent(
        &self,
        max_attempts: u32,
        out: &mut [u8],
        scratch: &mut [u8],
        mut copy: impl FnMut(u16, &mut [u8]),
    ) -> bool {
        debug_assert_eq!(out.len(), scratch.len());
        let mut held = false;
        for _ in 0..max_attempts {
            let offset = self.published();
            copy(offset, if held { &mut *scratch } else { &mut *out });
            fence(Ordering::Acquire);
            if self.published.load(Ordering::Relaxed) != offset {
                held = false;
                continue;
            }
            if !held {
                held = true;
                continue;
            }
            if *scratch == *out {
                return true;
            }
            out.copy_from_slice(scratch);
        }
        false
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn mirror_flips_top_bit_only() {
        assert_eq!(mirror_of(0x0010), 0x8010);
        assert_eq!(mirror_of(0x8010), 0x0010);
        assert_eq!(mirror_of(0x7FFF) & OFFSET_MASK, 0x7FFF);
    }

    #[test]
    fn write_alternates_between_copies() {
        let word = AtomicU16::new(0x0040);
        let cell = PingPong::new(&word);

        assert_eq!(cell.staging(), 0x8040);
        let first = cell.write_with(|target| assert_eq!(target, 0x8040));
        assert_eq!(first, 0x8040);
        assert_eq!(cell.published(), 0x8040);

        let second = cell.write_with(|target| assert_eq!(target, 0x0040));
        assert_eq!(second, 0x0040);
        assert_eq!(cell.published(), 0x0040);
    }

    #[test]
    fn quiet_read_takes_two_copies() {
        let word = AtomicU16::new(0x0004);
        let cell = PingPong::new(&word);
        let calls = Cell::new(0u32);
        let (mut out, mut scratch) = ([0u8; 4], [0u8; 4]);

        let ok = cell.read_consistent(8, &mut out, &mut scratch, |offset, dst| {
            calls.set(calls.get() + 1);
            dst.copy_from_slice(&u32::from(offset).to_le_bytes());
        });

        assert!(ok);
        assert_eq!(calls.get(), 2);
        assert_eq!(out, 4u32.to_le_bytes());
    }

    #[test]
    fn read_discards_copy_when_offset_moves() {
        let word = AtomicU16::new(0x0004);
        let cell = PingPong::new(&word);
        let calls = Cell::new(0u32);
        let (mut out, mut scratch) = ([0u8; 2], [0u8; 2]);

        let ok = cell.read_consistent(8, &mut out, &mut scratch, |offset, dst| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                // A writer publishes while the first copy is in progress.
                word.store(mirror_of(offset), Ordering::Release);
            }
            dst.copy_from_slice(&offset.to_le_bytes());
        });

        assert!(ok);
        assert_eq!(calls.get(), 3);
        assert_eq!(out, 0x8004u16.to_le_bytes());
    }

    #[test]
    fn lapped_copy_is_not_returned() {
        // The offset never moves, but the first copy caught a write halfway.
        let word = AtomicU16::new(0);
        let cell = PingPong::new(&word);
        let copies = [[1u8, 2], [2, 2], [2, 2]];
        let calls = Cell::new(0usize);
        let (mut out, mut scratch) = ([0u8; 2], [0u8; 2]);

        let ok = cell.read_consistent(8, &mut out, &mut scratch, |_, dst| {
            dst.copy_from_slice(&copies[calls.get()]);
            calls.set(calls.get() + 1);
        });

        assert!(ok);
        assert_eq!(calls.get(), 3);
        assert_eq!(out, [2, 2]);
    }

    #[test]
    fn read_gives_up_when_copies_never_agree() {
        let word = AtomicU16::new(0);
        let cell = PingPong::new(&word);
        let calls = Cell::new(0u8);
        let (mut out, mut scratch) = ([0u8; 1], [0u8; 1]);

        let ok = cell.read_consistent(5, &mut out, &mut scratch, |_, dst| {
            calls.set(calls.get() + 1);
            dst[0] = calls.get();
        });

        assert!(!ok);
        assert_eq!(calls.get(), 5);
    }
}
