//! # gridrt
//!
//! **A host/device compute runtime with a software accelerator.**
//!
//! gridrt lets a host program allocate memory, dispatch data-parallel kernels
//! onto a massively parallel device, and fold per-thread results with
//! shared-memory, SIMD-register and warp-shuffle reductions. The device is a
//! simulation: its timeline is a dedicated worker thread and its blocks run on
//! a rayon pool, but the programming model is the one of a real accelerator.
//!
//! ## Features
//!
//! - **Device contexts**: allocation, FIFO command queue, `synchronize`
//! - **Launch grids**: 3-axis grid/block dimensions, per-thread coordinates
//! - **Block primitives**: shared scratch memory, block barrier, warp shuffle
//! - **Tensor views**: row-/column-major layouts over flat buffers
//! - **Reductions**: Sum, Prod, Max, Min and custom combiners, three strategies
//!
//! ## Quick Start
//!
//! ```rust
//! use gridrt::prelude::*;
//!
//! # fn main() -> gridrt::error::Result<()> {
//! let ctx = DeviceContext::new()?;
//!
//! let data: Vec<f32> = (0..16).map(|i| i as f32).collect();
//! let host = ctx.create_host_buffer_from_slice(&data)?;
//! let input = ctx.create_device_buffer::<f32>(16)?;
//! let sums = ctx.create_device_buffer::<f32>(4)?;
//! let result = ctx.create_host_buffer::<f32>(4)?;
//!
//! ctx.enqueue_copy(&input, &host)?;
//! reduce_per_block(&ctx, ReductionStrategy::WarpShuffle, &input, &sums, 4, 4, ReduceOp::Sum)?;
//! ctx.enqueue_copy(&result, &sums)?;
//! ctx.synchronize()?;
//!
//! assert_eq!(result.to_vec()?, vec![6.0, 22.0, 38.0, 54.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): blocks of a launch run in parallel
//! - `f16` (default): half-precision element types (F16, BF16)
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (context lifecycle at `info`, enqueues
//! at `debug`, per-block execution at `trace`, device faults at `warn`) and
//! never installs a subscriber.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dtype;
pub mod error;
pub mod launch;
pub mod reduce;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ContextConfig;
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::launch::{Dim3, Kernel, LaunchConfig, ThreadContext, kernel};
    pub use crate::reduce::{
        Combiner, FnCombiner, ReduceOp, ReductionStrategy, reduce_blocks, reduce_per_block,
    };
    pub use crate::runtime::{Buffer, DeviceContext, MemoryLocation};
    pub use crate::tensor::{Layout, MemoryOrder, TensorView};
}
