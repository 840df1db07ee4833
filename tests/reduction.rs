//! Integration tests for block reductions across all strategies

mod common;

use common::{
    assert_allclose_f64, create_context, create_context_with, download, reference_reduce, upload,
};
use gridrt::prelude::*;
use gridrt::reduce::simd::horizontal_reduce;
use proptest::prelude::*;

fn run_reduce<T: Element, C: Combiner<T>>(
    ctx: &DeviceContext,
    strategy: ReductionStrategy,
    data: &[T],
    blocks: usize,
    threads: usize,
    combiner: C,
) -> Vec<T> {
    let input = upload(ctx, data);
    let output = ctx.create_device_buffer::<T>(blocks).unwrap();
    reduce_per_block(ctx, strategy, &input, &output, blocks, threads, combiner).unwrap();
    download(ctx, &output)
}

#[test]
fn test_sum_four_blocks_of_four() {
    let ctx = create_context();
    let data: Vec<f32> = (0..16).map(|i| i as f32).collect();

    for strategy in ReductionStrategy::ALL {
        let sums = run_reduce(&ctx, strategy, &data, 4, 4, ReduceOp::Sum);
        assert_eq!(sums, vec![6.0, 22.0, 38.0, 54.0], "{strategy}");
    }
}

#[test]
fn test_builtin_ops_all_strategies() {
    let ctx = create_context();
    let data: Vec<i32> = (0..96).map(|i| (i * 37 % 23) - 11).collect();

    for op in [ReduceOp::Sum, ReduceOp::Max, ReduceOp::Min] {
        let expected = reference_reduce(&data, 32, op);
        for strategy in ReductionStrategy::ALL {
            assert_eq!(
                run_reduce(&ctx, strategy, &data, 3, 32, op),
                expected,
                "{op:?} with {strategy}"
            );
        }
    }
}

#[test]
fn test_product_all_strategies() {
    let ctx = create_context();
    let data: Vec<f64> = (0..40).map(|i| [1.0, 2.0, 0.5, -1.0][i % 4]).collect();
    let expected = reference_reduce(&data, 20, ReduceOp::Prod);

    for strategy in ReductionStrategy::ALL {
        assert_eq!(
            run_reduce(&ctx, strategy, &data, 2, 20, ReduceOp::Prod),
            expected,
            "{strategy}"
        );
    }
}

#[test]
fn test_integer_overflow_wraps_in_every_strategy() {
    let ctx = create_context();
    // True sums are 0 and 0; intermediate partials overflow i8 in some orders
    let data: Vec<i8> = vec![100, 100, -100, -100, 127, 1, -128, 0];

    for strategy in ReductionStrategy::ALL {
        assert_eq!(run_reduce(&ctx, strategy, &data, 2, 4, ReduceOp::Sum), vec![0, 0], "{strategy}");
    }

    let factors: Vec<u8> = vec![16, 16, 2, 3, 255, 255, 1, 1];
    for strategy in ReductionStrategy::ALL {
        assert_eq!(
            run_reduce(&ctx, strategy, &factors, 2, 4, ReduceOp::Prod),
            vec![0, 1],
            "{strategy}"
        );
    }
}

#[test]
fn test_signed_zero_extrema_agree() {
    let ctx = create_context();
    let threads = 32;
    // Row 0 peaks at zero, row 1 bottoms out at zero; both signs present
    let data: Vec<f32> = (0..2 * threads)
        .map(|i| match (i / threads, i % 3) {
            (0, 0) => -0.0,
            (0, 1) => 0.0,
            (0, _) => -(i as f32),
            (_, 0) => 0.0,
            (_, 1) => -0.0,
            _ => i as f32,
        })
        .collect();

    for strategy in ReductionStrategy::ALL {
        let maxes = run_reduce(&ctx, strategy, &data, 2, threads, ReduceOp::Max);
        assert_eq!(maxes[0], 0.0, "{strategy}");
        let mins = run_reduce(&ctx, strategy, &data, 2, threads, ReduceOp::Min);
        assert_eq!(mins[1], 0.0, "{strategy}");
    }
}

#[test]
fn test_custom_combiner() {
    let ctx = create_context();
    let xor = FnCombiner::new(0u32, |a, b| a ^ b);
    let data: Vec<u32> = (0..5 * 48u32).map(|i| i.wrapping_mul(2654435761)).collect();
    let expected = reference_reduce(&data, 48, xor);

    for strategy in ReductionStrategy::ALL {
        assert_eq!(run_reduce(&ctx, strategy, &data, 5, 48, xor), expected, "{strategy}");
    }
}

#[test]
fn test_multi_warp_blocks() {
    let ctx = create_context_with(ContextConfig::default().with_workers(2).with_warp_size(4));
    let data: Vec<i64> = (0..3 * 10).collect();

    // 10 threads per block: warps of 4, 4 and a partial warp of 2
    let sums = run_reduce(&ctx, ReductionStrategy::WarpShuffle, &data, 3, 10, ReduceOp::Sum);
    assert_eq!(sums, vec![45, 145, 245]);

    let maxes = run_reduce(&ctx, ReductionStrategy::WarpShuffle, &data, 3, 10, ReduceOp::Max);
    assert_eq!(maxes, vec![9, 19, 29]);
}

#[test]
fn test_wide_blocks_default_warp() {
    let ctx = create_context();
    let threads = 300;
    let data: Vec<f32> = (0..2 * threads).map(|i| (i % 7) as f32).collect();
    let expected = reference_reduce(&data, threads, ReduceOp::Sum);

    for strategy in ReductionStrategy::ALL {
        let sums = run_reduce(&ctx, strategy, &data, 2, threads, ReduceOp::Sum);
        assert_eq!(sums, expected, "{strategy}");
    }
}

#[test]
fn test_single_thread_blocks() {
    let ctx = create_context();
    let data = [3.5f64, -1.0, 8.0];

    for strategy in ReductionStrategy::ALL {
        assert_eq!(
            run_reduce(&ctx, strategy, &data, 3, 1, ReduceOp::Min),
            data.to_vec(),
            "{strategy}"
        );
    }
}

#[test]
fn test_column_major_input() {
    let ctx = create_context();
    let (blocks, threads) = (3usize, 8usize);

    // Element (b, t) holds b * 100 + t and lives at t * blocks + b
    let mut data = vec![0i32; blocks * threads];
    for b in 0..blocks {
        for t in 0..threads {
            data[t * blocks + b] = (b * 100 + t) as i32;
        }
    }
    let input = upload(&ctx, &data);
    let view = input
        .view(Layout::column_major(&[blocks, threads]))
        .unwrap();

    for strategy in ReductionStrategy::ALL {
        let output = ctx.create_device_buffer::<i32>(blocks).unwrap();
        reduce_blocks(&ctx, strategy, &view, &output, ReduceOp::Sum).unwrap();
        assert_eq!(download(&ctx, &output), vec![28, 828, 1628], "{strategy}");
    }
}

#[test]
fn test_transposed_view_input() {
    let ctx = create_context();
    // Stored as (threads, blocks) row-major; reduced through its transpose
    let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
    let input = upload(&ctx, &data);
    let view = input
        .view(Layout::row_major(&[6, 4]))
        .unwrap()
        .transpose(0, 1)
        .unwrap();

    for strategy in ReductionStrategy::ALL {
        let output = ctx.create_device_buffer::<f32>(4).unwrap();
        reduce_blocks(&ctx, strategy, &view, &output, ReduceOp::Max).unwrap();
        assert_eq!(download(&ctx, &output), vec![20.0, 21.0, 22.0, 23.0], "{strategy}");
    }
}

#[test]
fn test_float_sum_close_to_reference() {
    let ctx = create_context();
    let threads = 256;
    let data: Vec<f64> = (0..4 * threads).map(|i| (i as f64 * 0.37).sin()).collect();
    let expected = reference_reduce(&data, threads, ReduceOp::Sum);

    for strategy in ReductionStrategy::ALL {
        let sums = run_reduce(&ctx, strategy, &data, 4, threads, ReduceOp::Sum);
        assert_allclose_f64(&sums, &expected, 1e-12, 1e-12, &strategy.to_string());
    }
}

#[test]
fn test_invalid_reduction_arguments() {
    let ctx = create_context();
    let input = ctx.create_device_buffer::<f32>(16).unwrap();
    let short = ctx.create_device_buffer::<f32>(2).unwrap();

    let err = reduce_per_block(
        &ctx,
        ReductionStrategy::SharedMemory,
        &input,
        &short,
        4,
        4,
        ReduceOp::Sum,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "output", .. }));

    let err = reduce_per_block(
        &ctx,
        ReductionStrategy::WarpShuffle,
        &input,
        &short,
        4,
        5,
        ReduceOp::Sum,
    )
    .unwrap_err();
    assert!(matches!(err, Error::LayoutOverflow { .. }));

    let cube = input.view(Layout::row_major(&[2, 2, 4])).unwrap();
    let err = reduce_blocks(&ctx, ReductionStrategy::SimdRegister, &cube, &short, ReduceOp::Sum)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "input", .. }));

    let err = reduce_per_block(
        &ctx,
        ReductionStrategy::WarpShuffle,
        &input,
        &short,
        0,
        4,
        ReduceOp::Sum,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidLaunchConfiguration { .. }));

    // blocks * threads does not fit in usize
    let err = reduce_per_block(
        &ctx,
        ReductionStrategy::SharedMemory,
        &input,
        &short,
        usize::MAX,
        2,
        ReduceOp::Sum,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::LayoutOverflow {
            required: usize::MAX,
            available: 16,
            ..
        }
    ));

    assert_eq!(ctx.pending_operations(), 0);
}

#[test]
fn test_block_larger_than_device_limit() {
    let ctx = create_context_with(
        ContextConfig::default()
            .with_workers(1)
            .with_max_threads_per_block(64),
    );
    let input = ctx.create_device_buffer::<f32>(128).unwrap();
    let output = ctx.create_device_buffer::<f32>(1).unwrap();

    let err = reduce_per_block(
        &ctx,
        ReductionStrategy::SharedMemory,
        &input,
        &output,
        1,
        128,
        ReduceOp::Sum,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidLaunchConfiguration { .. }));

    // One thread folds the whole row, so the block limit does not apply
    reduce_per_block(
        &ctx,
        ReductionStrategy::SimdRegister,
        &input,
        &output,
        1,
        128,
        ReduceOp::Sum,
    )
    .unwrap();
    ctx.synchronize().unwrap();
}

#[test]
fn test_horizontal_reduce_host_side() {
    let values: Vec<f32> = (1..=100).map(|i| i as f32).collect();
    assert_eq!(horizontal_reduce(&values, ReduceOp::Sum), 5050.0);
    assert_eq!(horizontal_reduce(&values, ReduceOp::Max), 100.0);
    assert_eq!(horizontal_reduce(&values[..3], ReduceOp::Prod), 6.0);
    assert_eq!(horizontal_reduce::<i32, _>(&[], ReduceOp::Min), i32::MAX);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_strategies_agree_integer_sum(
        blocks in 1usize..5,
        threads in 1usize..80,
        seed in any::<u64>(),
    ) {
        let ctx = create_context();
        let data: Vec<i64> = (0..blocks * threads)
            .map(|i| ((seed.wrapping_mul(i as u64 + 1) >> 33) % 1000) as i64 - 500)
            .collect();
        let expected = reference_reduce(&data, threads, ReduceOp::Sum);

        for strategy in ReductionStrategy::ALL {
            let got = run_reduce(&ctx, strategy, &data, blocks, threads, ReduceOp::Sum);
            prop_assert_eq!(&got, &expected, "{}", strategy);
        }
    }

    #[test]
    fn prop_strategies_agree_integral_floats(
        data in prop::collection::vec(-64i32..64, 1..200),
        threads in 1usize..40,
        op in prop::sample::select(vec![ReduceOp::Sum, ReduceOp::Max, ReduceOp::Min]),
    ) {
        let blocks = data.len() / threads;
        prop_assume!(blocks > 0);
        let data: Vec<f32> = data[..blocks * threads].iter().map(|&v| v as f32).collect();
        let expected = reference_reduce(&data, threads, op);

        let ctx = create_context();
        for strategy in ReductionStrategy::ALL {
            let got = run_reduce(&ctx, strategy, &data, blocks, threads, op);
            prop_assert_eq!(&got, &expected, "{:?} with {}", op, strategy);
        }
    }

    #[test]
    fn prop_wrapping_product_combiner(
        data in prop::collection::vec(any::<u32>(), 1..128),
        threads in 1usize..33,
    ) {
        let blocks = data.len() / threads;
        prop_assume!(blocks > 0);
        let data = &data[..blocks * threads];
        let combiner = FnCombiner::new(1u32, u32::wrapping_mul);
        let expected = reference_reduce(data, threads, combiner);

        let ctx = create_context();
        for strategy in ReductionStrategy::ALL {
            let got = run_reduce(&ctx, strategy, data, blocks, threads, combiner);
            prop_assert_eq!(&got, &expected, "{}", strategy);
        }
    }
}
