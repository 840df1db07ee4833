//! Layout overlay on a buffer

use super::Layout;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::Buffer;
use std::fmt;

/// Multi-dimensional view of a buffer
///
/// The view holds a shared handle to the buffer, so the memory stays alive as
/// long as any view (or queued kernel capturing one) does. `get` and `set`
/// alias the buffer's elements directly; there is no copy and no cache.
///
/// Inside kernels, indices outside the shape are caught by debug assertions;
/// the flat offset is always checked against the buffer length.
///
/// # Example
/// ```
/// use gridrt::prelude::*;
///
/// # fn main() -> gridrt::error::Result<()> {
/// let ctx = DeviceContext::new()?;
/// let buf = ctx.create_host_buffer_from_slice(&[0, 1, 2, 3, 4, 5i32])?;
///
/// let rows = TensorView::new(&buf, Layout::row_major(&[2, 3]))?;
/// let cols = TensorView::new(&buf, Layout::column_major(&[2, 3]))?;
/// assert_eq!(rows.get(&[1, 0]), 3);
/// assert_eq!(cols.get(&[1, 0]), 1);
/// # Ok(())
/// # }
/// ```
pub struct TensorView<T: Element> {
    buffer: Buffer<T>,
    layout: Layout,
}

impl<T: Element> TensorView<T> {
    /// Overlay `layout` on `buffer`
    ///
    /// Fails with `LayoutOverflow` if the layout addresses more elements than
    /// the buffer holds.
    pub fn new(buffer: &Buffer<T>, layout: Layout) -> Result<Self> {
        let fits = |n: Option<usize>| n.is_some_and(|n| n <= buffer.len());
        if !fits(layout.checked_elem_count()) || !fits(layout.checked_span()) {
            return Err(Error::layout_overflow(layout.shape(), buffer.len()));
        }

        Ok(Self {
            buffer: buffer.clone(),
            layout,
        })
    }

    /// The underlying buffer
    #[inline]
    pub fn buffer(&self) -> &Buffer<T> {
        &self.buffer
    }

    /// The layout
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Size along each axis
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Number of axes
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Number of logical elements
    #[inline]
    pub fn elem_count(&self) -> usize {
        self.layout.elem_count()
    }

    /// Flat buffer offset of `indices`
    #[inline]
    pub fn offset(&self, indices: &[usize]) -> usize {
        self.layout.index_unchecked(indices)
    }

    /// Flat buffer offset of `indices`, or None if any index is out of range
    #[inline]
    pub fn try_offset(&self, indices: &[usize]) -> Option<usize> {
        self.layout.index(indices)
    }

    /// Read the element at `indices`
    #[inline]
    pub fn get(&self, indices: &[usize]) -> T {
        self.buffer.load(self.offset(indices))
    }

    /// Write the element at `indices`
    #[inline]
    pub fn set(&self, indices: &[usize], value: T) {
        self.buffer.store(self.offset(indices), value)
    }

    /// View the same buffer with a new shape
    ///
    /// Only contiguous views can be reshaped; element counts must match.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let layout = self.layout.reshape(shape).ok_or_else(|| {
            Error::invalid_argument(
                "shape",
                format!("cannot reshape {} into {shape:?}", self.layout),
            )
        })?;
        Ok(Self {
            buffer: self.buffer.clone(),
            layout,
        })
    }

    /// View the same buffer with two axes swapped
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        let layout = self.layout.transpose(dim0, dim1).ok_or_else(|| {
            Error::invalid_argument(
                "dim",
                format!("axes ({dim0}, {dim1}) out of range for rank {}", self.ndim()),
            )
        })?;
        Ok(Self {
            buffer: self.buffer.clone(),
            layout,
        })
    }

    /// Gather the logical elements in row-major order
    ///
    /// Only host-resident buffers can be read from the host.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        if !self.buffer.is_host() {
            return Err(Error::NotHostAccessible {
                location: self.buffer.location(),
            });
        }

        let mut out = Vec::with_capacity(self.elem_count());
        if self.elem_count() == 0 {
            return Ok(out);
        }

        let shape = self.shape();
        let mut indices = vec![0usize; shape.len()];
        loop {
            out.push(self.get(&indices));

            // Odometer increment, last axis fastest
            let mut axis = shape.len();
            loop {
                if axis == 0 {
                    return Ok(out);
                }
                axis -= 1;
                indices[axis] += 1;
                if indices[axis] < shape[axis] {
                    break;
                }
                indices[axis] = 0;
            }
        }
    }
}

impl<T: Element> Clone for TensorView<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            layout: self.layout.clone(),
        }
    }
}

impl<T: Element> fmt::Debug for TensorView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("layout", &self.layout)
            .field("buffer", &self.buffer)
            .finish()
    }
}
