//! Memory allocator trait and the capacity-tracking allocator
//!
//! Every buffer holds a shared handle to the allocator that produced it and
//! returns its memory there when the last handle is dropped.

use crate::error::{Error, Result};
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Alignment of every allocation (one cache line, wide enough for any SIMD load)
pub(crate) const ALLOC_ALIGN: usize = 64;

/// Memory allocator trait for runtime backends
pub trait Allocator: Send + Sync {
    /// Allocate `size_bytes` of zeroed memory
    ///
    /// Returns a pointer (u64) or `Err(OutOfDeviceMemory)`.
    /// Zero-sized requests return 0 and consume no capacity.
    fn allocate(&self, size_bytes: usize) -> Result<u64>;

    /// Deallocate memory returned by `allocate`
    fn deallocate(&self, ptr: u64, size_bytes: usize);

    /// Get the total allocated bytes
    fn allocated_bytes(&self) -> usize {
        0 // Default: tracking not supported
    }

    /// Total bytes this allocator may hand out
    fn capacity(&self) -> usize {
        usize::MAX
    }
}

/// Allocator backed by the system heap with a fixed byte budget
///
/// Device contexts use one with the configured device memory capacity;
/// host buffers use one with an unbounded budget.
#[derive(Debug)]
pub struct TrackingAllocator {
    capacity: usize,
    allocated: AtomicUsize,
}

impl TrackingAllocator {
    /// Create an allocator that refuses to exceed `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Create an allocator without a budget
    pub fn unbounded() -> Self {
        Self::with_capacity(usize::MAX)
    }

    fn reserve(&self, size_bytes: usize) -> Result<()> {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(size_bytes)
                    .filter(|&total| total <= self.capacity)
            })
            .map(|_| ())
            .map_err(|current| Error::OutOfDeviceMemory {
                requested: size_bytes,
                available: self.capacity.saturating_sub(current),
            })
    }

    fn release(&self, size_bytes: usize) {
        self.allocated.fetch_sub(size_bytes, Ordering::AcqRel);
    }
}

impl Allocator for TrackingAllocator {
    fn allocate(&self, size_bytes: usize) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        self.reserve(size_bytes)?;

        let layout = match AllocLayout::from_size_align(size_bytes, ALLOC_ALIGN) {
            Ok(layout) => layout,
            Err(_) => {
                self.release(size_bytes);
                return Err(Error::OutOfDeviceMemory {
                    requested: size_bytes,
                    available: self.capacity.saturating_sub(self.allocated_bytes()),
                });
            }
        };

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            self.release(size_bytes);
            return Err(Error::OutOfDeviceMemory {
                requested: size_bytes,
                available: self.capacity.saturating_sub(self.allocated_bytes()),
            });
        }

        Ok(ptr as u64)
    }

    fn deallocate(&self, ptr: u64, size_bytes: usize) {
        if ptr == 0 || size_bytes == 0 {
            return;
        }

        if let Ok(layout) = AllocLayout::from_size_align(size_bytes, ALLOC_ALIGN) {
            // SAFETY: ptr was returned by `allocate` with this exact layout
            unsafe { dealloc(ptr as *mut u8, layout) };
        }
        self.release(size_bytes);
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
