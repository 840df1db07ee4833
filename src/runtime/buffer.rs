//! Typed, fixed-length memory regions
//!
//! A [`Buffer`] is a reference-counted handle to one allocation. Cloning the
//! handle is cheap and never copies data; the memory goes back to the
//! allocator that produced it when the last handle is dropped, including
//! handles captured by operations still waiting on a device timeline.

use super::ContextId;
use super::allocator::{Allocator, TrackingAllocator};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::tensor::{Layout, TensorView};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Where a buffer's memory lives
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Host memory, readable and writable from host code
    Host,
    /// Device memory, reachable only from kernels and enqueued operations
    Device,
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Device => f.write_str("device"),
        }
    }
}

struct BufferInner {
    ptr: u64,
    len: usize,
    size_bytes: usize,
    dtype: DType,
    location: MemoryLocation,
    context: ContextId,
    allocator: Arc<TrackingAllocator>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.allocator.deallocate(self.ptr, self.size_bytes);
    }
}

/// Flat, fixed-length, typed memory region
///
/// Element type and count are fixed at creation. Buffers are created by a
/// [`DeviceContext`](super::DeviceContext) and start zero-filled.
///
/// Kernels access elements with [`load`](Self::load) and
/// [`store`](Self::store). Host code reads and writes host-resident buffers
/// with [`to_vec`](Self::to_vec) and [`write_from_slice`](Self::write_from_slice),
/// after a `synchronize()` if device work touches the same buffer.
pub struct Buffer<T: Element> {
    inner: Arc<BufferInner>,
    _marker: PhantomData<T>,
}

impl<T: Element> Buffer<T> {
    pub(crate) fn allocate(
        len: usize,
        location: MemoryLocation,
        context: ContextId,
        allocator: Arc<TrackingAllocator>,
    ) -> Result<Self> {
        let size_bytes = len.checked_mul(std::mem::size_of::<T>()).ok_or_else(|| {
            Error::invalid_argument("count", format!("{len} elements of {} overflow usize", T::DTYPE))
        })?;
        let ptr = allocator.allocate(size_bytes)?;

        Ok(Self {
            inner: Arc::new(BufferInner {
                ptr,
                len,
                size_bytes,
                dtype: T::DTYPE,
                location,
                context,
                allocator,
            }),
            _marker: PhantomData,
        })
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Returns true if the buffer holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Element type tag
    #[inline]
    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// Size in bytes
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.inner.size_bytes
    }

    /// Host or device
    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.inner.location
    }

    /// Returns true for host-resident buffers
    #[inline]
    pub fn is_host(&self) -> bool {
        self.inner.location == MemoryLocation::Host
    }

    /// Context that allocated this buffer
    #[inline]
    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    /// Returns true if both handles refer to the same allocation
    #[inline]
    pub fn same_allocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the element at `index`
    ///
    /// Panics if `index >= len()`. Inside a kernel the panic becomes a
    /// kernel fault reported by the next `synchronize()`.
    #[inline]
    pub fn load(&self, index: usize) -> T {
        self.check_index(index);
        // SAFETY: index is in bounds and the allocation lives as long as `inner`
        unsafe { self.as_ptr().add(index).read() }
    }

    /// Write `value` at `index`
    ///
    /// Concurrent writes to the same element from different threads race and
    /// leave an unspecified value. Panics if `index >= len()`.
    #[inline]
    pub fn store(&self, index: usize, value: T) {
        self.check_index(index);
        // SAFETY: index is in bounds and the allocation lives as long as `inner`
        unsafe { self.as_ptr().add(index).write(value) }
    }

    #[inline]
    fn check_index(&self, index: usize) {
        assert!(
            index < self.inner.len,
            "index {index} out of bounds for buffer of {} elements",
            self.inner.len
        );
    }

    /// Copy a host-resident buffer into a `Vec`
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.require_host()?;
        // SAFETY: host buffer of `len` initialized elements
        Ok(unsafe { self.slice(0, self.len()) }.to_vec())
    }

    /// Overwrite a host-resident buffer with `data`
    pub fn write_from_slice(&self, data: &[T]) -> Result<()> {
        self.require_host()?;
        if data.len() != self.len() {
            return Err(Error::size_mismatch(self.len(), data.len()));
        }
        if !data.is_empty() {
            // SAFETY: equal lengths, distinct allocations
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), self.as_ptr(), data.len());
            }
        }
        Ok(())
    }

    /// Overlay a layout on this buffer
    pub fn view(&self, layout: Layout) -> Result<TensorView<T>> {
        TensorView::new(self, layout)
    }

    fn require_host(&self) -> Result<()> {
        if self.is_host() {
            Ok(())
        } else {
            Err(Error::NotHostAccessible {
                location: self.location(),
            })
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.inner.ptr as *mut T
    }

    /// Borrow `len` elements starting at `offset`
    ///
    /// # Safety
    /// `offset + len <= self.len()` and nothing writes the range while the
    /// slice is alive.
    pub(crate) unsafe fn slice(&self, offset: usize, len: usize) -> &[T] {
        debug_assert!(offset + len <= self.len());
        if len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.as_ptr().add(offset), len) }
    }

    /// Copy every element of `src` into `self`
    ///
    /// Callers check that lengths match.
    pub(crate) fn copy_from(&self, src: &Buffer<T>) {
        debug_assert_eq!(self.len(), src.len());
        if self.is_empty() || self.same_allocation(src) {
            return;
        }
        // SAFETY: equal lengths, distinct allocations
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.as_ptr(), self.len()) }
    }

    /// Set every element to `value`
    pub(crate) fn fill(&self, value: T) {
        for i in 0..self.len() {
            // SAFETY: i < len
            unsafe { self.as_ptr().add(i).write(value) }
        }
    }
}

impl<T: Element> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("dtype", &self.dtype())
            .field("len", &self.len())
            .field("location", &self.location())
            .field("context", &self.context_id())
            .finish()
    }
}
