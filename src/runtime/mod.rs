//! Host/device runtime
//!
//! A [`DeviceContext`] connects the host to one simulated accelerator. It
//! allocates [`Buffer`]s and owns the device timeline that executes copies,
//! fills and kernel launches in FIFO order.
//!
//! # Architecture
//!
//! ```text
//! DeviceContext (one per device connection)
//! ├── SimDevice       (limits: warp size, threads per block, shared memory)
//! ├── Allocators      (device: capacity-tracked, host: unbounded)
//! └── Timeline        (worker thread + FIFO queue + progress/fault state)
//!     └── BlockPool   (rayon pool executing the blocks of a launch)
//! ```
//!
//! Host code only waits for the device inside
//! [`DeviceContext::synchronize`] and when a context is dropped.

mod allocator;
mod buffer;
mod context;
mod device;
mod id;
mod timeline;

pub use allocator::{Allocator, TrackingAllocator};
pub use buffer::{Buffer, MemoryLocation};
pub use context::DeviceContext;
pub use device::SimDevice;
pub use id::ContextId;
