//! NEON register reductions for ARM64
//!
//! 4 f32 / 2 f64 lanes per 128-bit register; horizontal reduction with the
//! across-vector instructions, scalar tail for the remainder.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::aarch64::*;

use crate::reduce::ReduceOp;

const F32_LANES: usize = 4;
const F64_LANES: usize = 2;

macro_rules! fold_run {
    ($run:expr, $lanes:expr, $load:ident, $init:expr, $vertical:ident, $horizontal:expr, $scalar:expr) => {{
        let run = $run;
        let chunks = run.len() / $lanes;
        let ptr = run.as_ptr();

        let mut acc = $init;
        for c in 0..chunks {
            acc = $vertical(acc, $load(ptr.add(c * $lanes)));
        }

        let mut result = $horizontal(acc);
        for &x in &run[chunks * $lanes..] {
            result = $scalar(result, x);
        }
        result
    }};
}

/// Fold an f32 run with `op`
///
/// # Safety
/// CPU must support NEON (always true on AArch64).
#[target_feature(enable = "neon")]
pub unsafe fn reduce_f32(op: ReduceOp, run: &[f32]) -> f32 {
    match op {
        ReduceOp::Sum => fold_run!(
            run,
            F32_LANES,
            vld1q_f32,
            vdupq_n_f32(0.0),
            vaddq_f32,
            vaddvq_f32,
            |a: f32, b: f32| a + b
        ),
        ReduceOp::Prod => fold_run!(
            run,
            F32_LANES,
            vld1q_f32,
            vdupq_n_f32(1.0),
            vmulq_f32,
            hprod_f32,
            |a: f32, b: f32| a * b
        ),
        ReduceOp::Max => fold_run!(
            run,
            F32_LANES,
            vld1q_f32,
            vdupq_n_f32(f32::NEG_INFINITY),
            vmaxq_f32,
            vmaxvq_f32,
            f32::max
        ),
        ReduceOp::Min => fold_run!(
            run,
            F32_LANES,
            vld1q_f32,
            vdupq_n_f32(f32::INFINITY),
            vminq_f32,
            vminvq_f32,
            f32::min
        ),
    }
}

/// Fold an f64 run with `op`
///
/// # Safety
/// CPU must support NEON (always true on AArch64).
#[target_feature(enable = "neon")]
pub unsafe fn reduce_f64(op: ReduceOp, run: &[f64]) -> f64 {
    match op {
        ReduceOp::Sum => fold_run!(
            run,
            F64_LANES,
            vld1q_f64,
            vdupq_n_f64(0.0),
            vaddq_f64,
            vaddvq_f64,
            |a: f64, b: f64| a + b
        ),
        ReduceOp::Prod => fold_run!(
            run,
            F64_LANES,
            vld1q_f64,
            vdupq_n_f64(1.0),
            vmulq_f64,
            hprod_f64,
            |a: f64, b: f64| a * b
        ),
        ReduceOp::Max => fold_run!(
            run,
            F64_LANES,
            vld1q_f64,
            vdupq_n_f64(f64::NEG_INFINITY),
            vmaxq_f64,
            vmaxvq_f64,
            f64::max
        ),
        ReduceOp::Min => fold_run!(
            run,
            F64_LANES,
            vld1q_f64,
            vdupq_n_f64(f64::INFINITY),
            vminq_f64,
            vminvq_f64,
            f64::min
        ),
    }
}

/// Horizontal product of 4 f32s (no across-vector multiply exists)
#[target_feature(enable = "neon")]
#[inline]
unsafe fn hprod_f32(v: float32x4_t) -> f32 {
    let pairs = vmul_f32(vget_low_f32(v), vget_high_f32(v));
    vget_lane_f32::<0>(pairs) * vget_lane_f32::<1>(pairs)
}

#[target_feature(enable = "neon")]
#[inline]
unsafe fn hprod_f64(v: float64x2_t) -> f64 {
    vgetq_lane_f64::<0>(v) * vgetq_lane_f64::<1>(v)
}
