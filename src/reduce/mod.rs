//! Block reductions
//!
//! Every strategy folds one block's worth of per-thread values into a single
//! value written at `output[block_linear]`:
//!
//! | Strategy | Launch | Communication |
//! |----------|--------|---------------|
//! | [`SharedMemory`](ReductionStrategy::SharedMemory) | `threads` per block, cooperative, `threads * size_of::<T>()` shared bytes | shared scratch + block barrier, thread 0 folds |
//! | [`SimdRegister`](ReductionStrategy::SimdRegister) | one thread per block | none; lane-wise vector combine + horizontal reduce |
//! | [`WarpShuffle`](ReductionStrategy::WarpShuffle) | `threads` per block, cooperative | `shuffle_down` tree per warp, warp partials staged in shared memory |
//!
//! For an associative and commutative combiner all three produce the same
//! per-block result, up to floating point reassociation.

mod shared;
pub mod simd;
mod warp;

pub use shared::SharedMemoryReduce;
pub use simd::SimdRegisterReduce;
pub use warp::{WarpShuffleReduce, warp_reduce};

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::{Buffer, DeviceContext};
use crate::tensor::{Layout, TensorView};
use std::fmt;

/// Binary operation folded over the values of a block
///
/// Implementations must be associative and commutative, and
/// [`identity`](Self::identity) must be a neutral element of
/// [`combine`](Self::combine). Strategies combine values in different
/// orders and pad partial warps and vector lanes with the identity.
///
/// Inputs on which the combiner is not associative and commutative fall
/// outside that contract and the strategies may disagree on them. For the
/// float [`ReduceOp::Max`] and [`ReduceOp::Min`] that means NaN inputs.
pub trait Combiner<T: Element>: Copy + Send + Sync + 'static {
    /// Neutral element
    fn identity(&self) -> T;

    /// Combine two partial results
    fn combine(&self, a: T, b: T) -> T;

    /// Built-in operation this combiner performs, enabling hardware paths
    fn reduce_op(&self) -> Option<ReduceOp> {
        None
    }
}

/// Built-in reduction operations
///
/// Integer `Sum` and `Prod` wrap on overflow, which keeps them associative so
/// every strategy returns the same value. Float `Max` and `Min` treat `-0.0`
/// and `+0.0` as equal and may return either one; NaN inputs are unsupported.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Sum of all values (identity 0)
    Sum,
    /// Product of all values (identity 1)
    Prod,
    /// Largest value (identity: lowest representable)
    Max,
    /// Smallest value (identity: highest representable)
    Min,
}

impl<T: Element> Combiner<T> for ReduceOp {
    #[inline]
    fn identity(&self) -> T {
        match self {
            Self::Sum => T::zero(),
            Self::Prod => T::one(),
            Self::Max => T::lowest(),
            Self::Min => T::highest(),
        }
    }

    #[inline]
    fn combine(&self, a: T, b: T) -> T {
        match self {
            Self::Sum => a.wrapping_add(b),
            Self::Prod => a.wrapping_mul(b),
            Self::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
            Self::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
        }
    }

    #[inline]
    fn reduce_op(&self) -> Option<ReduceOp> {
        Some(*self)
    }
}

/// Combiner built from an identity and a plain function
///
/// # Example
/// ```
/// use gridrt::reduce::{Combiner, FnCombiner};
/// let xor = FnCombiner::new(0u32, |a, b| a ^ b);
/// assert_eq!(xor.combine(0b1100, 0b1010), 0b0110);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct FnCombiner<T: Element> {
    identity: T,
    combine: fn(T, T) -> T,
}

impl<T: Element> FnCombiner<T> {
    /// Combiner with neutral element `identity` folding with `combine`
    pub fn new(identity: T, combine: fn(T, T) -> T) -> Self {
        Self { identity, combine }
    }
}

impl<T: Element> Combiner<T> for FnCombiner<T> {
    #[inline]
    fn identity(&self) -> T {
        self.identity
    }

    #[inline]
    fn combine(&self, a: T, b: T) -> T {
        (self.combine)(a, b)
    }
}

/// How a block's values are combined
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReductionStrategy {
    /// Scratch memory, block barrier, serial fold by thread 0
    SharedMemory,
    /// One thread per block folding a contiguous run in vector registers
    SimdRegister,
    /// Register exchange within warps
    WarpShuffle,
}

impl ReductionStrategy {
    /// Every strategy
    pub const ALL: [Self; 3] = [Self::SharedMemory, Self::SimdRegister, Self::WarpShuffle];
}

impl fmt::Display for ReductionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedMemory => f.write_str("shared-memory"),
            Self::SimdRegister => f.write_str("simd-register"),
            Self::WarpShuffle => f.write_str("warp-shuffle"),
        }
    }
}

/// Enqueue a per-block reduction of a `(blocks, threads)` view
///
/// `input[b, t]` is the value of thread `t` in block `b`; the result for
/// block `b` is written to `output[b]`. The view may use any layout.
pub fn reduce_blocks<T, C>(
    ctx: &DeviceContext,
    strategy: ReductionStrategy,
    input: &TensorView<T>,
    output: &Buffer<T>,
    combiner: C,
) -> Result<()>
where
    T: Element,
    C: Combiner<T>,
{
    let &[blocks, threads] = input.shape() else {
        return Err(Error::invalid_argument(
            "input",
            format!("expected a (blocks, threads) view, got shape {:?}", input.shape()),
        ));
    };
    if blocks == 0 || threads == 0 {
        return Err(Error::invalid_launch(format!(
            "cannot reduce {blocks} blocks of {threads} threads"
        )));
    }
    if output.len() < blocks {
        return Err(Error::invalid_argument(
            "output",
            format!("holds {} elements, {blocks} blocks need one each", output.len()),
        ));
    }
    ctx.check_resident(input.buffer())?;
    ctx.check_resident(output)?;

    let grid = u32::try_from(blocks)
        .map_err(|_| Error::invalid_launch(format!("{blocks} blocks exceed the grid limit")))?;
    let block = u32::try_from(threads)
        .map_err(|_| Error::invalid_launch(format!("{threads} threads exceed the block limit")))?;

    tracing::debug!(%strategy, blocks, threads, dtype = %T::DTYPE, "enqueue reduction");

    match strategy {
        ReductionStrategy::SharedMemory => {
            let kernel = SharedMemoryReduce::new(input.clone(), output.clone(), combiner);
            ctx.enqueue_function(kernel, SharedMemoryReduce::<T, C>::launch_config(grid, block))
        }
        ReductionStrategy::SimdRegister => {
            let kernel = SimdRegisterReduce::new(input.clone(), output.clone(), combiner);
            ctx.enqueue_function(kernel, SimdRegisterReduce::<T, C>::launch_config(grid))
        }
        ReductionStrategy::WarpShuffle => {
            let kernel = WarpShuffleReduce::new(input.clone(), output.clone(), combiner);
            let config =
                WarpShuffleReduce::<T, C>::launch_config(grid, block, ctx.device().warp_size());
            ctx.enqueue_function(kernel, config)
        }
    }
}

/// Enqueue a per-block reduction of a flat buffer holding `blocks * threads` values
///
/// Block `b` reduces `input[b * threads .. (b + 1) * threads]`.
pub fn reduce_per_block<T, C>(
    ctx: &DeviceContext,
    strategy: ReductionStrategy,
    input: &Buffer<T>,
    output: &Buffer<T>,
    blocks: usize,
    threads: usize,
    combiner: C,
) -> Result<()>
where
    T: Element,
    C: Combiner<T>,
{
    let view = TensorView::new(input, Layout::row_major(&[blocks, threads]))?;
    reduce_blocks(ctx, strategy, &view, output, combiner)
}
