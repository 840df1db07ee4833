//! AVX2 register reductions
//!
//! Manual horizontal reductions since AVX2 lacks _mm256_reduce_* intrinsics.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use crate::reduce::ReduceOp;

const F32_LANES: usize = 8;
const F64_LANES: usize = 4;

/// Vertical combine over full vectors, horizontal finish, scalar tail
macro_rules! fold_run {
    ($run:expr, $lanes:expr, $load:ident, $init:expr, $vertical:ident, $horizontal:ident, $scalar:expr) => {{
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
/// CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn reduce_f32(op: ReduceOp, run: &[f32]) -> f32 {
    match op {
        ReduceOp::Sum => fold_run!(
            run,
            F32_LANES,
            _mm256_loadu_ps,
            _mm256_setzero_ps(),
            _mm256_add_ps,
            hsum_f32,
            |a: f32, b: f32| a + b
        ),
        ReduceOp::Prod => fold_run!(
            run,
            F32_LANES,
            _mm256_loadu_ps,
            _mm256_set1_ps(1.0),
            _mm256_mul_ps,
            hprod_f32,
            |a: f32, b: f32| a * b
        ),
        ReduceOp::Max => fold_run!(
            run,
            F32_LANES,
            _mm256_loadu_ps,
            _mm256_set1_ps(f32::NEG_INFINITY),
            _mm256_max_ps,
            hmax_f32,
            f32::max
        ),
        ReduceOp::Min => fold_run!(
            run,
            F32_LANES,
            _mm256_loadu_ps,
            _mm256_set1_ps(f32::INFINITY),
            _mm256_min_ps,
            hmin_f32,
            f32::min
        ),
    }
}

/// Fold an f64 run with `op`
///
/// # Safety
/// CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn reduce_f64(op: ReduceOp, run: &[f64]) -> f64 {
    match op {
        ReduceOp::Sum => fold_run!(
            run,
            F64_LANES,
            _mm256_loadu_pd,
            _mm256_setzero_pd(),
            _mm256_add_pd,
            hsum_f64,
            |a: f64, b: f64| a + b
        ),
        ReduceOp::Prod => fold_run!(
            run,
            F64_LANES,
            _mm256_loadu_pd,
            _mm256_set1_pd(1.0),
            _mm256_mul_pd,
            hprod_f64,
            |a: f64, b: f64| a * b
        ),
        ReduceOp::Max => fold_run!(
            run,
            F64_LANES,
            _mm256_loadu_pd,
            _mm256_set1_pd(f64::NEG_INFINITY),
            _mm256_max_pd,
            hmax_f64,
            f64::max
        ),
        ReduceOp::Min => fold_run!(
            run,
            F64_LANES,
            _mm256_loadu_pd,
            _mm256_set1_pd(f64::INFINITY),
            _mm256_min_pd,
            hmin_f64,
            f64::min
        ),
    }
}

// ============================================================================
// Horizontal reduction helpers
// ============================================================================

/// Horizontal sum of 8 f32s in __m256
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hsum_f32(v: __m256) -> f32 {
    // Add high 128 bits to low 128 bits
    let high = _mm256_extractf128_ps(v, 1);
    let low = _mm256_castps256_ps128(v);
    let sum128 = _mm_add_ps(low, high);

    let shuf = _mm_movehdup_ps(sum128); // [1,1,3,3]
    let sum64 = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(sum64, sum64);
    _mm_cvtss_f32(_mm_add_ss(sum64, shuf2))
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hprod_f32(v: __m256) -> f32 {
    let prod128 = _mm_mul_ps(_mm256_castps256_ps128(v), _mm256_extractf128_ps(v, 1));
    let prod64 = _mm_mul_ps(prod128, _mm_movehdup_ps(prod128));
    _mm_cvtss_f32(_mm_mul_ss(prod64, _mm_movehl_ps(prod64, prod64)))
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hmax_f32(v: __m256) -> f32 {
    let max128 = _mm_max_ps(_mm256_castps256_ps128(v), _mm256_extractf128_ps(v, 1));
    let max64 = _mm_max_ps(max128, _mm_movehdup_ps(max128));
    _mm_cvtss_f32(_mm_max_ss(max64, _mm_movehl_ps(max64, max64)))
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hmin_f32(v: __m256) -> f32 {
    let min128 = _mm_min_ps(_mm256_castps256_ps128(v), _mm256_extractf128_ps(v, 1));
    let min64 = _mm_min_ps(min128, _mm_movehdup_ps(min128));
    _mm_cvtss_f32(_mm_min_ss(min64, _mm_movehl_ps(min64, min64)))
}

/// Horizontal sum of 4 f64s in __m256d
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hsum_f64(v: __m256d) -> f64 {
    let high = _mm256_extractf128_pd(v, 1);
    let low = _mm256_castpd256_pd128(v);
    let sum128 = _mm_add_pd(low, high);

    let shuf = _mm_unpackhi_pd(sum128, sum128);
    _mm_cvtsd_f64(_mm_add_sd(sum128, shuf))
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hprod_f64(v: __m256d) -> f64 {
    let prod128 = _mm_mul_pd(_mm256_castpd256_pd128(v), _mm256_extractf128_pd(v, 1));
    _mm_cvtsd_f64(_mm_mul_sd(prod128, _mm_unpackhi_pd(prod128, prod128)))
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hmax_f64(v: __m256d) -> f64 {
    let max128 = _mm_max_pd(_mm256_castpd256_pd128(v), _mm256_extractf128_pd(v, 1));
    _mm_cvtsd_f64(_mm_max_sd(max128, _mm_unpackhi_pd(max128, max128)))
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hmin_f64(v: __m256d) -> f64 {
    let min128 = _mm_min_pd(_mm256_castpd256_pd128(v), _mm256_extractf128_pd(v, 1));
    _mm_cvtsd_f64(_mm_min_sd(min128, _mm_unpackhi_pd(min128, min128)))
}
