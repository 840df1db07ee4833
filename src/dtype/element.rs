//! Element trait for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// Trait for types that can be elements of a buffer
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - values cross the host/device timelines
/// - `Pod + Zeroable` - buffers are raw memory, zero bytes are a valid value
/// - `Add + Sub + Mul + Div` - arithmetic for kernels and combiners
/// - `PartialOrd` - comparison for max/min reductions
///
/// Every implementor is at most 8 bytes wide; warp shuffles rely on it.
pub trait Element:
    Copy
    + Send
    + Sync
    + Pod
    + Zeroable
    + Debug
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + PartialOrd
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;

    /// Smallest value (negative infinity for floats); identity of `max`
    fn lowest() -> Self;

    /// Largest value (positive infinity for floats); identity of `min`
    fn highest() -> Self;

    /// Addition that wraps around on integer overflow
    fn wrapping_add(self, rhs: Self) -> Self;

    /// Multiplication that wraps around on integer overflow
    fn wrapping_mul(self, rhs: Self) -> Self;
}

macro_rules! impl_element_int {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn zero() -> Self {
                    0
                }

                #[inline]
                fn one() -> Self {
                    1
                }

                #[inline]
                fn lowest() -> Self {
                    <$ty>::MIN
                }

                #[inline]
                fn highest() -> Self {
                    <$ty>::MAX
                }

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$ty>::wrapping_add(self, rhs)
                }

                #[inline]
                fn wrapping_mul(self, rhs: Self) -> Self {
                    <$ty>::wrapping_mul(self, rhs)
                }
            }
        )*
    };
}

impl_element_int!(
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
    u64 => U64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
);

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }

    #[inline]
    fn lowest() -> Self {
        f64::NEG_INFINITY
    }

    #[inline]
    fn highest() -> Self {
        f64::INFINITY
    }

    // IEEE arithmetic saturates to infinity instead of wrapping
    #[inline]
    fn wrapping_add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline]
    fn wrapping_mul(self, rhs: Self) -> Self {
        self * rhs
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }

    #[inline]
    fn lowest() -> Self {
        f32::NEG_INFINITY
    }

    #[inline]
    fn highest() -> Self {
        f32::INFINITY
    }

    // IEEE arithmetic saturates to infinity instead of wrapping
    #[inline]
    fn wrapping_add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline]
    fn wrapping_mul(self, rhs: Self) -> Self {
        self * rhs
    }
}

// ============================================================================
// Half-precision floating point types (requires "f16" feature)
// ============================================================================

#[cfg(feature = "f16")]
impl Element for half::f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn zero() -> Self {
        half::f16::ZERO
    }

    #[inline]
    fn one() -> Self {
        half::f16::ONE
    }

    #[inline]
    fn lowest() -> Self {
        half::f16::NEG_INFINITY
    }

    #[inline]
    fn highest() -> Self {
        half::f16::INFINITY
    }

    // IEEE arithmetic saturates to infinity instead of wrapping
    #[inline]
    fn wrapping_add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline]
    fn wrapping_mul(self, rhs: Self) -> Self {
        self * rhs
    }
}

#[cfg(feature = "f16")]
impl Element for half::bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline]
    fn zero() -> Self {
        half::bf16::ZERO
    }

    #[inline]
    fn one() -> Self {
        half::bf16::ONE
    }

    #[inline]
    fn lowest() -> Self {
        half::bf16::NEG_INFINITY
    }

    #[inline]
    fn highest() -> Self {
        half::bf16::INFINITY
    }

    // IEEE arithmetic saturates to infinity instead of wrapping
    #[inline]
    fn wrapping_add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline]
    fn wrapping_mul(self, rhs: Self) -> Self {
        self * rhs
    }
}
