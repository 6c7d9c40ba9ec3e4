//! Lock-free element reads and writes.
//!
//! A write fills the mirror copy of the element and then flips the header
//! offset to it. A read only returns a copy that two consecutive validated
//! copies agree on, and gives up with [`ShmError::ReadContended`] rather than
//! hand back anything else. Each element must have a single writer at a time,
//! which is the caller's contract: the table only checks that the writing
//! instance registered the element.

use std::borrow::Cow;

use bytemuck::Pod;
use roswell_primitives::PingPong;
use roswell_wire::element::{MAX_STRING_LEN, STRING_RESERVED};
use roswell_wire::{ElementHeader, ElementKind};

use crate::ShmError;
use crate::table::{ElementId, SharedTable};

/// Copies per attempt before a reader yields its time slice.
const READ_ATTEMPTS: u32 = 64;

/// Attempts before a read reports contention.
const READ_ROUNDS: u32 = 16;

/// Elements up to this size are validated without a heap scratch buffer.
const INLINE_SCRATCH: usize = 256;

/// Result of a string write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    /// Bytes stored, excluding the terminator.
    pub len: usize,
    /// Whether the input was cut to fit.
    pub truncated: bool,
}

impl SharedTable {
    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Publish a new value for a fixed-size element. `payload` must be exactly
    /// the element's size.
    pub fn write_bytes(&self, id: ElementId, payload: &[u8]) -> Result<(), ShmError> {
        let (header, stored) = self.writable(id).map_err(|e| self.fail(e))?;
        match stored {
            ElementKind::Fixed(size) if size as usize == payload.len() => {}
            stored => {
                return Err(self.fail(ShmError::TypeMismatch {
                    id,
                    stored,
                    requested_len: Some(payload.len()),
                }));
            }
        }

        self.publish(header, payload);
        self.set_message(Cow::Borrowed("written"));
        Ok(())
    }

    /// Publish `value` into a fixed element of exactly `size_of::<T>()` bytes.
    pub fn write_value<T: Pod>(&self, id: ElementId, value: &T) -> Result<(), ShmError> {
        self.write_bytes(id, bytemuck::bytes_of(value))
    }

    /// Publish a string element. Input longer than 63 bytes is cut at the
    /// last char boundary that fits; that is reported, not an error.
    pub fn write_str(&self, id: ElementId, s: &str) -> Result<Written, ShmError> {
        let (header, stored) = self.writable(id).map_err(|e| self.fail(e))?;
        if !stored.is_string() {
            return Err(self.fail(ShmError::TypeMismatch {
                id,
                stored,
                requested_len: None,
            }));
        }

        let mut len = s.len().min(MAX_STRING_LEN);
        while !s.is_char_boundary(len) {
            len -= 1;
        }
        let truncated = len < s.len();

        let mut buf = [0u8; STRING_RESERVED as usize];
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        self.publish(header, &buf[..=len]);

        if truncated {
            tracing::warn!(
                title = %self.title(),
                %id,
                len = s.len(),
                kept = len,
                "string too long, truncated"
            );
            self.set_message(Cow::Borrowed("string too long"));
        } else {
            self.set_message(Cow::Borrowed("written"));
        }
        Ok(Written { len, truncated })
    }

    fn writable(&self, id: ElementId) -> Result<(&ElementHeader, ElementKind), ShmError> {
        let element = self.element(id)?;
        if !self.is_publisher(id) {
            return Err(ShmError::NotPublisher(id));
        }
        Ok(element)
    }

    fn publish(&self, header: &ElementHeader, bytes: &[u8]) {
        PingPong::new(&header.offset).write_with(|target| {
            self.region.copy_in(self.offsets.data(target), bytes);
        });
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Copy the published value into `buf`, returning its length. For strings
    /// the length excludes the terminator.
    pub fn read_bytes(&self, id: ElementId, buf: &mut [u8]) -> Result<usize, ShmError> {
        let (header, kind) = self.element(id).map_err(|e| self.fail(e))?;
        let len = match kind {
            ElementKind::Fixed(size) => {
                let size = size as usize;
                if buf.len() < size {
                    return Err(self.fail(ShmError::BufferTooSmall {
                        needed: size,
                        available: buf.len(),
                    }));
                }
                self.copy_published(id, header, &mut buf[..size])
                    .map_err(|e| self.fail(e))?;
                size
            }
            ElementKind::BoundedString => {
                let raw = self.read_string_raw(id, header).map_err(|e| self.fail(e))?;
                let len = nul_terminated_len(&raw);
                if buf.len() < len {
                    return Err(self.fail(ShmError::BufferTooSmall {
                        needed: len,
                        available: buf.len(),
                    }));
                }
                buf[..len].copy_from_slice(&raw[..len]);
                len
            }
        };
        self.set_message(Cow::Borrowed("read"));
        Ok(len)
    }

    /// Read a fixed element as `T`. The element size must equal
    /// `size_of::<T>()`.
    pub fn read_value<T: Pod>(&self, id: ElementId) -> Result<T, ShmError> {
        let (header, kind) = self.element(id).map_err(|e| self.fail(e))?;
        let want = core::mem::size_of::<T>();
        if kind != ElementKind::Fixed(want as u16) || want > u16::MAX as usize {
            return Err(self.fail(ShmError::TypeMismatch {
                id,
                stored: kind,
                requested_len: Some(want),
            }));
        }

        let mut value = T::zeroed();
        self.copy_published(id, header, bytemuck::bytes_of_mut(&mut value))
            .map_err(|e| self.fail(e))?;
        self.set_message(Cow::Borrowed("read"));
        Ok(value)
    }

    /// Read a string element. Invalid UTF-8 is replaced.
    pub fn read_string(&self, id: ElementId) -> Result<String, ShmError> {
        let (header, kind) = self.element(id).map_err(|e| self.fail(e))?;
        if !kind.is_string() {
            return Err(self.fail(ShmError::TypeMismatch {
                id,
                stored: kind,
                requested_len: None,
            }));
        }

        let raw = self.read_string_raw(id, header).map_err(|e| self.fail(e))?;
        let len = nul_terminated_len(&raw);
        self.set_message(Cow::Borrowed("read"));
        Ok(String::from_utf8_lossy(&raw[..len]).into_owned())
    }

    fn read_string_raw(
        &self,
        id: ElementId,
        header: &ElementHeader,
    ) -> Result<[u8; STRING_RESERVED as usize], ShmError> {
        let mut raw = [0u8; STRING_RESERVED as usize];
        self.copy_published(id, header, &mut raw)?;
        Ok(raw)
    }

    fn copy_published(
        &self,
        id: ElementId,
        header: &ElementHeader,
        out: &mut [u8],
    ) -> Result<(), ShmError> {
        let mut inline = [0u8; INLINE_SCRATCH];
        let mut heap = Vec::new();
        let scratch = if out.len() <= INLINE_SCRATCH {
            &mut inline[..out.len()]
        } else {
            heap.resize(out.len(), 0);
            &mut heap[..]
        };

        let cell = PingPong::new(&header.offset);
        for round in 0..READ_ROUNDS {
            if round > 0 {
                std::thread::yield_now();
            }
            let ok = cell.read_consistent(READ_ATTEMPTS, out, scratch, |offset, dst| {
                self.region.copy_out(self.offsets.data(offset), dst);
            });
            if ok {
                return Ok(());
            }
        }

        tracing::debug!(
            title = %self.title(),
            %id,
            len = out.len(),
            "read kept racing the writer"
        );
        Err(ShmError::ReadContended(id))
    }

    // -------------------------------------------------------------------------
    // Name-based wrappers
    // -------------------------------------------------------------------------

    pub fn write_bytes_named(&self, name: &str, payload: &[u8]) -> Result<(), ShmError> {
        let id = self.subscribe(name)?;
        self.write_bytes(id, payload)
    }

    pub fn write_value_named<T: Pod>(&self, name: &str, value: &T) -> Result<(), ShmError> {
        let id = self.subscribe(name)?;
        self.write_value(id, value)
    }

    pub fn write_str_named(&self, name: &str, s: &str) -> Result<Written, ShmError> {
        let id = self.subscribe(name)?;
        self.write_str(id, s)
    }

    pub fn read_bytes_named(&self, name: &str, buf: &mut [u8]) -> Result<usize, ShmError> {
        let id = self.subscribe(name)?;
        self.read_bytes(id, buf)
    }

    pub fn read_value_named<T: Pod>(&self, name: &str) -> Result<T, ShmError> {
        let id = self.subscribe(name)?;
        self.read_value(id)
    }

    pub fn read_string_named(&self, name: &str) -> Result<String, ShmError> {
        let id = self.subscribe(name)?;
        self.read_string(id)
    }
}

fn nul_terminated_len(raw: &[u8]) -> usize {
    raw.iter()
        .position(|&b| b == 0)
        .unwrap_or(raw.len())
        .min(MAX_STRING_LEN)
}
