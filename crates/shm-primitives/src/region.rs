use core::ptr;

/// A view over a contiguous byte range, typically a shared memory mapping.
///
/// `Region` does not own its memory. Whoever created it (an mmap wrapper, or
/// [`HeapRegion`] in tests) keeps the backing storage alive for as long as any
/// copy of the region is in use.
#[derive(Clone, Copy, Debug)]
pub struct Region {
    base: *mut u8,
    len: usize,
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create a region from a raw base pointer and length.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long as
    /// the region (or any copy of it) is used, and must be at least 8-byte
    /// aligned.
    #[inline]
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        debug_assert!(!base.is_null(), "region base must not be null");
        Self { base, len }
    }

    /// Length of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `offset..offset + len` lies inside the region.
    #[inline]
    pub fn contains(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.len)
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the region.
    #[inline]
    pub fn offset(&self, offset: usize) -> *mut u8 {
        assert!(offset <= self.len, "offset out of bounds");
        unsafe { self.base.add(offset) }
    }

    /// Reinterpret the bytes at `offset` as a `T`.
    ///
    /// # Safety
    ///
    /// The bytes at `offset` must hold a valid, properly aligned `T`, and all
    /// shared mutation of it must go through atomics.
    #[inline]
    pub unsafe fn get<T>(&self, offset: usize) -> &T {
        assert!(
            self.contains(offset, core::mem::size_of::<T>()),
            "typed access out of bounds"
        );
        let ptr = self.offset(offset) as *const T;
        debug_assert!(ptr.is_aligned(), "typed access misaligned");
        unsafe { &*ptr }
    }

    /// Copy `src` into the region at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the destination range is out of bounds.
    #[inline]
    pub fn copy_in(&self, offset: usize, src: &[u8]) {
        assert!(self.contains(offset, src.len()), "copy_in out of bounds");
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.base.add(offset), src.len()) };
    }

    /// Copy bytes at `offset` out of the region into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if the source range is out of bounds.
    #[inline]
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        assert!(self.contains(offset, dst.len()), "copy_out out of bounds");
        unsafe { ptr::copy_nonoverlapping(self.base.add(offset), dst.as_mut_ptr(), dst.len()) };
    }

    /// Fill `offset..offset + len` with `byte`.
    #[inline]
    pub fn fill(&self, offset: usize, len: usize, byte: u8) {
        assert!(self.contains(offset, len), "fill out of bounds");
        unsafe { ptr::write_bytes(self.base.add(offset), byte, len) };
    }
}

/// Heap-backed region for tests and single-process use.
#[cfg(any(test, feature = "alloc"))]
pub struct HeapRegion {
    ptr: *mut u8,
    layout: alloc::alloc::Layout,
}

#[cfg(any(test, feature = "alloc"))]
unsafe impl Send for HeapRegion {}
#[cfg(any(test, feature = "alloc"))]
unsafe impl Sync for HeapRegion {}

#[cfg(any(test, feature = "alloc"))]
impl HeapRegion {
    /// Allocate `len` zeroed bytes, 64-byte aligned.
    pub fn new_zeroed(len: usize) -> Self {
        assert!(len > 0, "heap region must not be empty");
        let layout = alloc::alloc::Layout::from_size_align(len, 64)
            .unwrap_or_else(|_| panic!("invalid heap region layout"));
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            alloc::alloc::handle_alloc_error(layout);
        }
        Self { ptr, layout }
    }

    /// A region view over this allocation.
    pub fn region(&self) -> Region {
        unsafe { Region::from_raw(self.ptr, self.layout.size()) }
    }
}

#[cfg(any(test, feature = "alloc"))]
impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { alloc::alloc::dealloc(self.ptr, self.layout) };
    }
}
