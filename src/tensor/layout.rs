//! Layout: shape, strides and memory order of a tensor view

use smallvec::SmallVec;
use std::fmt;

/// Stack allocation threshold for dimensions
/// Launch-shaped views rarely exceed 4 axes, so we stack-allocate up to 4
const STACK_DIMS: usize = 4;

/// Shape type: size along each axis
pub type Shape = SmallVec<[usize; STACK_DIMS]>;

/// Strides type: element offset between consecutive indices along each axis
/// NOTE: Strides are in ELEMENTS, not bytes
pub type Strides = SmallVec<[usize; STACK_DIMS]>;

/// Product of `shape`, or None if it does not fit in `usize`
pub(crate) fn checked_elem_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Order in which the axes of a layout are laid out in memory
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemoryOrder {
    /// Last axis is contiguous (C order)
    #[default]
    RowMajor,
    /// First axis is contiguous (Fortran order)
    ColumnMajor,
}

/// Layout describes how logical indices map to flat buffer offsets
///
/// Offset of the element at indices `[i0, i1, ..., in]`:
///   `i0 * strides[0] + i1 * strides[1] + ... + in * strides[n]`
#[derive(Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Strides,
    order: MemoryOrder,
}

impl Layout {
    /// Create a row-major layout from a shape
    ///
    /// # Example
    /// ```
    /// use gridrt::tensor::Layout;
    /// let layout = Layout::row_major(&[2, 3, 4]);
    /// assert_eq!(layout.strides(), &[12, 4, 1]);
    /// ```
    pub fn row_major(shape: &[usize]) -> Self {
        Self::with_order(shape, MemoryOrder::RowMajor)
    }

    /// Create a column-major layout from a shape
    ///
    /// # Example
    /// ```
    /// use gridrt::tensor::Layout;
    /// let layout = Layout::column_major(&[2, 3, 4]);
    /// assert_eq!(layout.strides(), &[1, 2, 6]);
    /// ```
    pub fn column_major(shape: &[usize]) -> Self {
        Self::with_order(shape, MemoryOrder::ColumnMajor)
    }

    /// Create a layout with the given memory order
    pub fn with_order(shape: &[usize], order: MemoryOrder) -> Self {
        let shape: Shape = shape.iter().copied().collect();
        let strides = Self::compute_strides(&shape, order);
        Self {
            shape,
            strides,
            order,
        }
    }

    /// One-dimensional layout over `len` elements
    pub fn linear(len: usize) -> Self {
        Self::row_major(&[len])
    }

    // Strides saturate when the shape's element count overflows; such a
    // layout is rejected before any view is built over it.
    fn compute_strides(shape: &[usize], order: MemoryOrder) -> Strides {
        let mut strides: Strides = SmallVec::with_capacity(shape.len());
        let mut stride = 1usize;

        match order {
            MemoryOrder::RowMajor => {
                // Last axis first
                for &dim in shape.iter().rev() {
                    strides.push(stride);
                    stride = stride.saturating_mul(dim);
                }
                strides.reverse();
            }
            MemoryOrder::ColumnMajor => {
                for &dim in shape {
                    strides.push(stride);
                    stride = stride.saturating_mul(dim);
                }
            }
        }

        strides
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the strides
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Memory order this layout was built with
    #[inline]
    pub fn order(&self) -> MemoryOrder {
        self.order
    }

    /// Number of dimensions (rank)
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements, saturating at `usize::MAX`
    #[inline]
    pub fn elem_count(&self) -> usize {
        self.checked_elem_count().unwrap_or(usize::MAX)
    }

    /// Total number of elements, or None if the count overflows `usize`
    #[inline]
    pub fn checked_elem_count(&self) -> Option<usize> {
        checked_elem_count(&self.shape)
    }

    /// Check whether the strides are the canonical ones for the memory order
    ///
    /// A transposed layout is not contiguous.
    pub fn is_contiguous(&self) -> bool {
        self.strides == Self::compute_strides(&self.shape, self.order)
    }

    /// Flat offset for given indices, or None if out of range
    pub fn index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.ndim() {
            return None;
        }

        let mut linear = 0usize;
        for ((&idx, &dim), &stride) in indices.iter().zip(&self.shape).zip(&self.strides) {
            if idx >= dim {
                return None;
            }
            linear = linear.checked_add(idx.checked_mul(stride)?)?;
        }

        Some(linear)
    }

    /// Flat offset for given indices without a bounds check
    ///
    /// Out-of-range indices are caught by `debug_assert!` in debug builds only.
    #[inline]
    pub fn index_unchecked(&self, indices: &[usize]) -> usize {
        debug_assert_eq!(indices.len(), self.ndim(), "rank mismatch");
        indices
            .iter()
            .zip(&self.shape)
            .zip(&self.strides)
            .map(|((&idx, &dim), &stride)| {
                debug_assert!(idx < dim, "index {idx} out of bounds for axis of size {dim}");
                idx * stride
            })
            .sum()
    }

    /// Create a transposed layout (swap two axes)
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Option<Self> {
        if dim0 >= self.ndim() || dim1 >= self.ndim() {
            return None;
        }

        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.swap(dim0, dim1);
        strides.swap(dim0, dim1);

        Some(Self {
            shape,
            strides,
            order: self.order,
        })
    }

    /// Create a layout with a new shape in the same memory order
    ///
    /// Returns None if this layout is not contiguous or the element counts differ.
    pub fn reshape(&self, new_shape: &[usize]) -> Option<Self> {
        if !self.is_contiguous() {
            return None;
        }
        if checked_elem_count(new_shape)? != self.checked_elem_count()? {
            return None;
        }
        Some(Self::with_order(new_shape, self.order))
    }

    /// Largest flat offset reachable through this layout, plus one
    ///
    /// Zero for layouts with an empty axis. Saturates at `usize::MAX`.
    pub fn span(&self) -> usize {
        self.checked_span().unwrap_or(usize::MAX)
    }

    /// Like [`span`](Self::span), or None if the offset overflows `usize`
    pub fn checked_span(&self) -> Option<usize> {
        if self.shape.iter().any(|&d| d == 0) {
            return Some(0);
        }
        self.shape
            .iter()
            .zip(&self.strides)
            .try_fold(1usize, |acc, (&dim, &stride)| {
                acc.checked_add((dim - 1).checked_mul(stride)?)
            })
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout {{ shape: {:?}, strides: {:?}, order: {:?} }}",
            self.shape.as_slice(),
            self.strides.as_slice(),
            self.order
        )
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.shape.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let layout = Layout::row_major(&[2, 3, 4]);
        assert_eq!(layout.shape(), &[2, 3, 4]);
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert_eq!(layout.elem_count(), 24);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn test_column_major_layout() {
        let layout = Layout::column_major(&[4, 4]);
        assert_eq!(layout.strides(), &[1, 4]);
        assert_eq!(layout.index(&[1, 2]), Some(9));
        assert_eq!(layout.order(), MemoryOrder::ColumnMajor);
    }

    #[test]
    fn test_index() {
        let layout = Layout::row_major(&[2, 3]);
        assert_eq!(layout.index(&[0, 0]), Some(0));
        assert_eq!(layout.index(&[0, 2]), Some(2));
        assert_eq!(layout.index(&[1, 0]), Some(3));
        assert_eq!(layout.index(&[1, 2]), Some(5));
        assert_eq!(layout.index(&[2, 0]), None); // Out of bounds
        assert_eq!(layout.index(&[1]), None); // Rank mismatch
    }

    #[test]
    fn test_transpose() {
        let layout = Layout::row_major(&[2, 3]);
        let transposed = layout.transpose(0, 1).unwrap();
        assert_eq!(transposed.shape(), &[3, 2]);
        assert_eq!(transposed.strides(), &[1, 3]);
        assert!(!transposed.is_contiguous());
        assert!(transposed.reshape(&[6]).is_none());
    }

    #[test]
    fn test_reshape() {
        let layout = Layout::column_major(&[2, 3, 4]);
        let reshaped = layout.reshape(&[6, 4]).unwrap();
        assert_eq!(reshaped.strides(), &[1, 6]);
        assert!(layout.reshape(&[5, 5]).is_none());
    }

    #[test]
    fn test_span() {
        assert_eq!(Layout::row_major(&[4, 4]).span(), 16);
        assert_eq!(Layout::row_major(&[3, 0]).span(), 0);
        assert_eq!(Layout::row_major(&[]).span(), 1);
    }

    #[test]
    fn test_overflowing_shape() {
        let layout = Layout::row_major(&[usize::MAX, 2]);
        assert_eq!(layout.checked_elem_count(), None);
        assert_eq!(layout.elem_count(), usize::MAX);
        assert_eq!(layout.checked_span(), None);
        assert_eq!(layout.index(&[usize::MAX - 1, 1]), None);
        assert!(layout.reshape(&[2, usize::MAX]).is_none());

        let tall = Layout::column_major(&[3, usize::MAX / 2, 4]);
        assert_eq!(tall.checked_elem_count(), None);
        assert_eq!(tall.strides()[2], usize::MAX);

        // An empty axis keeps the count at zero however large the others are
        let empty = Layout::row_major(&[0, usize::MAX, usize::MAX]);
        assert_eq!(empty.checked_elem_count(), Some(0));
        assert_eq!(empty.checked_span(), Some(0));
    }
}
