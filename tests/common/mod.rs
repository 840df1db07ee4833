//! Common test utilities
#![allow(dead_code)]

use gridrt::prelude::*;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per test binary
///
/// Honors `RUST_LOG`; output is captured by the test harness.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Create a context with a small, fixed worker pool
pub fn create_context() -> DeviceContext {
    create_context_with(ContextConfig::default().with_workers(4))
}

/// Create a context from an explicit configuration
pub fn create_context_with(config: ContextConfig) -> DeviceContext {
    init_tracing();
    DeviceContext::with_config(config).expect("failed to create device context")
}

/// Upload `data` to a new device buffer and wait for the copy
pub fn upload<T: Element>(ctx: &DeviceContext, data: &[T]) -> Buffer<T> {
    let host = ctx.create_host_buffer_from_slice(data).unwrap();
    let device = ctx.create_device_buffer::<T>(data.len()).unwrap();
    ctx.enqueue_copy(&device, &host).unwrap();
    ctx.synchronize().unwrap();
    device
}

/// Copy a device buffer back to the host and wait for it
pub fn download<T: Element>(ctx: &DeviceContext, buffer: &Buffer<T>) -> Vec<T> {
    let host = ctx.create_host_buffer::<T>(buffer.len()).unwrap();
    ctx.enqueue_copy_to(buffer, &host).unwrap();
    ctx.synchronize().unwrap();
    host.to_vec().unwrap()
}

/// Sequential reference fold of each `threads`-long row of `data`
pub fn reference_reduce<T: Element, C: Combiner<T>>(data: &[T], threads: usize, combiner: C) -> Vec<T> {
    data.chunks(threads)
        .map(|row| {
            row.iter()
                .fold(combiner.identity(), |acc, &v| combiner.combine(acc, v))
        })
        .collect()
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}
