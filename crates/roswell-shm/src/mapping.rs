//! POSIX shared-memory segment backing a table.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;
use std::os::unix::io::AsRawFd;

use roswell_primitives::Region;

use crate::ShmError;
use crate::layout::TableOffsets;

/// A mapped `shm_open` object.
pub(crate) struct ShmMapping {
    base_addr: *mut u8,
    size: usize,
    /// Whether this call created the kernel object.
    created: bool,
    _file: File,
}

// SAFETY: the mapping is only accessed through atomics and the table's
// single-writer protocol.
unsafe impl Send for ShmMapping {}
unsafe impl Sync for ShmMapping {}

impl ShmMapping {
    /// Create the segment `/{name}` sized for `capacity`, or attach to it if
    /// it already exists. An existing, sized segment keeps its own capacity.
    pub(crate) fn open(name: &str, capacity: usize) -> Result<(Self, TableOffsets), ShmError> {
        let requested = TableOffsets::calculate(capacity)?;
        let path = CString::new(format!("/{}", name))
            .map_err(|_| ShmError::Layout("segment name contains NUL"))?;

        let fd = unsafe {
            libc::shm_open(
                path.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666 as libc::mode_t,
            )
        };
        let (file, created) = if fd >= 0 {
            (unsafe { File::from_raw_fd(fd) }, true)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(ShmError::Io(err));
            }
            let fd = unsafe { libc::shm_open(path.as_ptr(), libc::O_RDWR, 0o666 as libc::mode_t) };
            if fd < 0 {
                return Err(ShmError::Io(io::Error::last_os_error()));
            }
            (unsafe { File::from_raw_fd(fd) }, false)
        };

        let existing = file.metadata().map_err(ShmError::Io)?.len() as usize;
        let offsets = if existing == 0 {
            // Fresh object, or the creator has not sized it yet.
            file.set_len(requested.total as u64)
                .map_err(ShmError::Io)?;
            requested
        } else {
            let capacity = TableOffsets::capacity_from_size(existing)
                .ok_or(ShmError::Layout("segment size matches no table capacity"))?;
            TableOffsets::calculate(capacity)?
        };

        let base_addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                offsets.total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if base_addr == libc::MAP_FAILED {
            return Err(ShmError::Io(io::Error::last_os_error()));
        }

        tracing::debug!(
            segment = name,
            created,
            capacity = offsets.capacity,
            size = offsets.total,
            "mapped table segment"
        );

        Ok((
            Self {
                base_addr: base_addr as *mut u8,
                size: offsets.total,
                created,
                _file: file,
            },
            offsets,
        ))
    }

    pub(crate) fn created(&self) -> bool {
        self.created
    }

    pub(crate) fn region(&self) -> Region {
        // SAFETY: the mapping stays alive as long as `self`, and mmap returns
        // page-aligned memory.
        unsafe { Region::from_raw(self.base_addr, self.size) }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        // SAFETY: base_addr and size were valid when created.
        unsafe {
            libc::munmap(self.base_addr as *mut libc::c_void, self.size);
        }
    }
}
