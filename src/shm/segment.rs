//! Anonymous shared mappings.
//!
//! A segment is mapped `MAP_SHARED | MAP_ANONYMOUS`, so it stays shared with
//! every process forked after it was created. Fresh mappings are zero-filled.

use crate::error::Result;
use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, munmap};
use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// One shared memory mapping.
pub struct Segment {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: the mapping is plain memory; all cross-process and cross-thread
// access goes through atomics or through slots guarded by the channel
// head/tail protocol.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Map `len` bytes of zeroed shared memory.
    pub(crate) fn map(len: usize) -> Result<Self> {
        let length = NonZeroUsize::new(len).unwrap_or(NonZeroUsize::MIN);

        // Safety: no fixed address is requested, so the kernel picks a fresh
        // range that aliases nothing in this process.
        let ptr = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_ANONYMOUS,
            )?
        };

        Ok(Self {
            ptr: ptr.cast(),
            len: length.get(),
        })
    }

    /// Length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Reference a `T` living at `offset` bytes into the segment.
    ///
    /// # Safety
    /// `offset` must be aligned for `T`, `offset + size_of::<T>()` must lie
    /// inside the mapping, and `T` must be valid for a zeroed bit pattern
    /// (atomics are).
    pub(crate) unsafe fn at<T>(&self, offset: usize) -> &T {
        debug_assert!(offset + std::mem::size_of::<T>() <= self.len);
        debug_assert_eq!(offset % std::mem::align_of::<T>(), 0);
        unsafe { &*(self.as_ptr().add(offset) as *const T) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Safety: ptr/len describe exactly the mapping created in `map`, and
        // every borrower holds an Arc to this segment.
        unsafe {
            let _ = munmap(self.ptr.cast(), self.len);
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_segment_is_zeroed() {
        let segment = Segment::map(4096).unwrap();
        assert_eq!(segment.len(), 4096);
        let bytes = unsafe { std::slice::from_raw_parts(segment.as_ptr(), segment.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_atomic_at_offset() {
        let segment = Segment::map(128).unwrap();
        let counter: &AtomicU64 = unsafe { segment.at(64) };
        counter.fetch_add(3, Ordering::SeqCst);
        let again: &AtomicU64 = unsafe { segment.at(64) };
        assert_eq!(again.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_zero_length_maps_one_byte() {
        let segment = Segment::map(0).unwrap();
        assert_eq!(segment.len(), 1);
    }
}
