//! In-register SIMD reduction
//!
//! One thread owns a contiguous run of values. It combines them lane-wise in
//! fixed-width vectors and finishes with a horizontal reduction, with no
//! cross-thread communication.
//!
//! # Architecture Support
//!
//! | Architecture | Instruction Set | Vector Width | Used for |
//! |--------------|-----------------|--------------|----------|
//! | x86-64       | AVX2            | 256 bits     | f32/f64 built-in ops |
//! | ARM64        | NEON            | 128 bits     | f32/f64 built-in ops |
//! | Any          | Portable lanes  | 8 elements   | everything else |

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "aarch64")]
mod neon;

use super::{Combiner, ReduceOp};
use crate::dtype::{DType, Element};
use crate::launch::{Kernel, LaunchConfig, ThreadContext};
use crate::runtime::Buffer;
use crate::tensor::{MemoryOrder, TensorView};
use std::sync::OnceLock;

/// Width of the portable lane array
pub const PORTABLE_LANES: usize = 8;

/// Minimum run length for which the hardware path is taken
const SIMD_THRESHOLD: usize = 16;

/// SIMD capability level detected at runtime
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    /// AVX2 (256-bit vectors, 8 f32s or 4 f64s)
    Avx2 = 2,
    /// NEON (128-bit vectors, 4 f32s or 2 f64s)
    Neon = 1,
    /// Portable lane array
    Scalar = 0,
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Avx2 => "AVX2",
            Self::Neon => "NEON",
            Self::Scalar => "Scalar",
        })
    }
}

static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Best SIMD level of the current CPU (cached after the first call)
#[inline]
pub fn detect_simd() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(detect_simd_uncached)
}

#[cold]
fn detect_simd_uncached() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        // NEON is mandatory on AArch64
        return SimdLevel::Neon;
    }

    SimdLevel::Scalar
}

/// Fold `values` with `combiner` in vector registers
///
/// Built-in operations on `f32`/`f64` use the hardware path; everything else
/// combines through a portable array of [`PORTABLE_LANES`] lanes. Returns the
/// identity for an empty run.
pub fn horizontal_reduce<T, C>(values: &[T], combiner: C) -> T
where
    T: Element,
    C: Combiner<T>,
{
    if let Some(op) = combiner.reduce_op() {
        if let Some(result) = native_reduce(op, values) {
            return result;
        }
    }
    lane_reduce(values, combiner)
}

fn native_reduce<T: Element>(op: ReduceOp, values: &[T]) -> Option<T> {
    if values.len() < SIMD_THRESHOLD {
        return None;
    }

    match T::DTYPE {
        DType::F32 => {
            let run: &[f32] = bytemuck::try_cast_slice(values).ok()?;
            bytemuck::try_cast(reduce_f32(op, run)?).ok()
        }
        DType::F64 => {
            let run: &[f64] = bytemuck::try_cast_slice(values).ok()?;
            bytemuck::try_cast(reduce_f64(op, run)?).ok()
        }
        _ => None,
    }
}

fn reduce_f32(op: ReduceOp, run: &[f32]) -> Option<f32> {
    #[cfg(target_arch = "x86_64")]
    if detect_simd() == SimdLevel::Avx2 {
        // SAFETY: AVX2 support was detected
        return Some(unsafe { avx2::reduce_f32(op, run) });
    }

    #[cfg(target_arch = "aarch64")]
    if detect_simd() == SimdLevel::Neon {
        // SAFETY: NEON is always present on AArch64
        return Some(unsafe { neon::reduce_f32(op, run) });
    }

    let _ = (op, run);
    None
}

fn reduce_f64(op: ReduceOp, run: &[f64]) -> Option<f64> {
    #[cfg(target_arch = "x86_64")]
    if detect_simd() == SimdLevel::Avx2 {
        // SAFETY: AVX2 support was detected
        return Some(unsafe { avx2::reduce_f64(op, run) });
    }

    #[cfg(target_arch = "aarch64")]
    if detect_simd() == SimdLevel::Neon {
        // SAFETY: NEON is always present on AArch64
        return Some(unsafe { neon::reduce_f64(op, run) });
    }

    let _ = (op, run);
    None
}

/// Portable lane-array reduction
fn lane_reduce<T, C>(values: &[T], combiner: C) -> T
where
    T: Element,
    C: Combiner<T>,
{
    let mut lanes = [combiner.identity(); PORTABLE_LANES];

    let mut chunks = values.chunks_exact(PORTABLE_LANES);
    for chunk in &mut chunks {
        for (lane, &v) in lanes.iter_mut().zip(chunk) {
            *lane = combiner.combine(*lane, v);
        }
    }
    for (lane, &v) in lanes.iter_mut().zip(chunks.remainder()) {
        *lane = combiner.combine(*lane, v);
    }

    // Horizontal tree: 8 -> 4 -> 2 -> 1
    let mut width = PORTABLE_LANES;
    while width > 1 {
        width /= 2;
        for i in 0..width {
            lanes[i] = combiner.combine(lanes[i], lanes[i + width]);
        }
    }
    lanes[0]
}

/// One thread per block folds the block's whole run with
/// [`horizontal_reduce`]. Rows that are not contiguous in memory are
/// gathered into a local run first.
pub struct SimdRegisterReduce<T: Element, C: Combiner<T>> {
    input: TensorView<T>,
    output: Buffer<T>,
    combiner: C,
    contiguous_rows: bool,
}

impl<T: Element, C: Combiner<T>> SimdRegisterReduce<T, C> {
    /// Reduce `input[b, ..]` into `output[b]`
    pub fn new(input: TensorView<T>, output: Buffer<T>, combiner: C) -> Self {
        let layout = input.layout();
        let contiguous_rows = layout.order() == MemoryOrder::RowMajor && layout.is_contiguous();
        Self {
            input,
            output,
            combiner,
            contiguous_rows,
        }
    }

    /// `blocks` single-thread blocks
    pub fn launch_config(blocks: u32) -> LaunchConfig {
        LaunchConfig::linear(blocks, 1)
    }
}

impl<T: Element, C: Combiner<T>> Kernel for SimdRegisterReduce<T, C> {
    fn execute(&self, thread: &ThreadContext<'_>) {
        let block = thread.block_linear();
        let run_len = self.input.shape()[1];

        let result = if self.contiguous_rows {
            let start = self.input.offset(&[block, 0]);
            assert!(start + run_len <= self.input.buffer().len());
            // SAFETY: bounds checked above; the run is only read
            let run = unsafe { self.input.buffer().slice(start, run_len) };
            horizontal_reduce(run, self.combiner)
        } else {
            let run: Vec<T> = (0..run_len).map(|t| self.input.get(&[block, t])).collect();
            horizontal_reduce(&run, self.combiner)
        };

        self.output.store(block, result);
    }

    fn name(&self) -> &str {
        "simd_register_reduce"
    }
}
