//! Integration tests for launch grids and thread addressing

mod common;

use common::{create_context, create_context_with, download};
use gridrt::launch::GlobalId;
use gridrt::prelude::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_every_thread_runs_exactly_once() {
    let ctx = create_context();
    let config = LaunchConfig::new((3, 2, 2), (4, 2, 1));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    ctx.enqueue_function(
        kernel("record", move |t| {
            log.lock().push((t.block_idx(), t.thread_idx()));
        }),
        config,
    )
    .unwrap();
    ctx.synchronize().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 3 * 2 * 2 * 4 * 2);

    let unique: HashSet<_> = seen.iter().copied().collect();
    let expected: HashSet<_> = config.coordinates().collect();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(unique, expected);
}

#[test]
fn test_global_index_covers_range() {
    let ctx = create_context();
    let out = ctx.create_device_buffer::<u32>(4 * 8).unwrap();

    let o = out.clone();
    ctx.enqueue_function(
        kernel("iota", move |t| {
            let i = t.global_index();
            o.store(i, i as u32);
        }),
        LaunchConfig::linear(4, 8),
    )
    .unwrap();

    assert_eq!(download(&ctx, &out), (0..32).collect::<Vec<u32>>());
}

#[test]
fn test_multi_axis_global_id() {
    let ctx = create_context();
    let (width, height) = (6usize, 4usize);
    let out = ctx.create_device_buffer::<u32>(width * height).unwrap();

    let o = out.clone();
    ctx.enqueue_function(
        kernel("coords", move |t| {
            let GlobalId { x, y, z } = t.global_id();
            assert_eq!(z, 0);
            o.store(y * width + x, (y * 100 + x) as u32);
        }),
        LaunchConfig::new((3, 2), (2, 2)),
    )
    .unwrap();

    let values = download(&ctx, &out);
    for y in 0..height {
        for x in 0..width {
            assert_eq!(values[y * width + x], (y * 100 + x) as u32);
        }
    }
}

#[test]
fn test_block_and_thread_linear_indices() {
    let ctx = create_context();
    let config = LaunchConfig::new((2, 3), (2, 2, 2));
    let out = ctx.create_device_buffer::<u64>(config.total_threads()).unwrap();

    let o = out.clone();
    ctx.enqueue_function(
        kernel("linear", move |t| {
            let expected_block = t.grid_dim().linearize(t.block_idx());
            let expected_thread = t.block_dim().linearize(t.thread_idx());
            assert_eq!(t.block_linear(), expected_block);
            assert_eq!(t.thread_linear(), expected_thread);
            o.store(t.global_linear(), 1);
        }),
        config,
    )
    .unwrap();

    assert!(download(&ctx, &out).iter().all(|&v| v == 1));
}

#[test]
fn test_lane_and_warp_ids() {
    let ctx = create_context_with(ContextConfig::default().with_workers(2).with_warp_size(4));
    let lanes = ctx.create_device_buffer::<u32>(10).unwrap();
    let warps = ctx.create_device_buffer::<u32>(10).unwrap();

    let (l, w) = (lanes.clone(), warps.clone());
    ctx.enqueue_function(
        kernel("warp_ids", move |t| {
            l.store(t.thread_linear(), t.lane_id() as u32);
            w.store(t.thread_linear(), t.warp_id() as u32);
        }),
        LaunchConfig::linear(1, 10),
    )
    .unwrap();

    assert_eq!(download(&ctx, &lanes), vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
    assert_eq!(download(&ctx, &warps), vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2]);
}

#[test]
fn test_shuffle_down_zero_fills() {
    let ctx = create_context();
    let out = ctx.create_device_buffer::<i32>(4).unwrap();

    let o = out.clone();
    ctx.enqueue_function(
        kernel("shuffle", move |t| {
            let lane = t.lane_id() as i32;
            let v = t.shuffle_down(lane, 1);
            o.store(t.thread_linear(), v);
        }),
        LaunchConfig::linear(1, 4).cooperative(),
    )
    .unwrap();

    assert_eq!(download(&ctx, &out), vec![1, 2, 3, 0]);
}

#[test]
fn test_shuffle_down_or_uses_fill() {
    let ctx = create_context();
    let out = ctx.create_device_buffer::<f32>(4).unwrap();

    let o = out.clone();
    ctx.enqueue_function(
        kernel("shuffle_fill", move |t| {
            let v = t.shuffle_down_or(t.lane_id() as f32, 2, -1.0);
            o.store(t.thread_linear(), v);
        }),
        LaunchConfig::linear(1, 4).cooperative(),
    )
    .unwrap();

    assert_eq!(download(&ctx, &out), vec![2.0, 3.0, -1.0, -1.0]);
}

#[test]
fn test_shared_memory_is_per_block() {
    let ctx = create_context();
    let out = ctx.create_device_buffer::<u32>(8).unwrap();

    let o = out.clone();
    ctx.enqueue_function(
        kernel("per_block", move |t| {
            let shared = t.shared::<u32>();
            if t.thread_linear() == 0 {
                shared.store(0, t.block_linear() as u32 * 10);
            }
            t.barrier();
            o.store(t.global_index(), shared.load(0));
        }),
        LaunchConfig::linear(4, 2).with_shared_mem(4).cooperative(),
    )
    .unwrap();

    assert_eq!(download(&ctx, &out), vec![0, 0, 10, 10, 20, 20, 30, 30]);
}

#[test]
fn test_cooperative_threads_bounded_by_block_limit() {
    let ctx = create_context_with(
        ContextConfig::default()
            .with_workers(4)
            .with_max_threads_per_block(64),
    );
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (l, p) = (Arc::clone(&live), Arc::clone(&peak));
    ctx.enqueue_function(
        kernel("peak_threads", move |t| {
            let now = l.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            t.barrier();
            l.fetch_sub(1, Ordering::SeqCst);
        }),
        LaunchConfig::linear(8, 64).cooperative(),
    )
    .unwrap();
    ctx.synchronize().unwrap();

    // Four workers could run four blocks at once; only one fits the budget
    assert_eq!(peak.load(Ordering::SeqCst), 64);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_dimensions_fail_fast() {
    let ctx = create_context();
    for config in [
        LaunchConfig::new((0, 1, 1), 32),
        LaunchConfig::new(4, (32, 0, 1)),
        LaunchConfig::linear(1, 2048),
    ] {
        let err = ctx
            .enqueue_function(kernel("noop", |_t| {}), config)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLaunchConfiguration { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
    assert_eq!(ctx.pending_operations(), 0);
}
