//! Device context: allocation, command queue and synchronization

use super::allocator::{Allocator, TrackingAllocator};
use super::buffer::{Buffer, MemoryLocation};
use super::timeline::{Executor, Timeline};
use super::{ContextId, SimDevice};
use crate::config::ContextConfig;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::launch::{Kernel, LaunchConfig};
use std::sync::Arc;

/// Connection to one simulated accelerator
///
/// A context owns a single device timeline. Operations enqueued on it run in
/// enqueue order relative to each other and asynchronously relative to the
/// host; [`synchronize`](Self::synchronize) is the only call that waits for
/// the device.
///
/// # Example
///
/// ```
/// use gridrt::prelude::*;
///
/// # fn main() -> gridrt::error::Result<()> {
/// let ctx = DeviceContext::new()?;
/// let host = ctx.create_host_buffer_from_slice(&[1.0f32, 2.0, 3.0, 4.0])?;
/// let dev = ctx.create_device_buffer::<f32>(4)?;
/// ctx.enqueue_copy(&dev, &host)?;
///
/// let d = dev.clone();
/// ctx.enqueue_function(
///     kernel("double", move |t| {
///         let i = t.global_index();
///         d.store(i, d.load(i) * 2.0);
///     }),
///     LaunchConfig::linear(1, 4),
/// )?;
///
/// ctx.enqueue_copy_to(&dev, &host)?;
/// ctx.synchronize()?;
/// assert_eq!(host.to_vec()?, vec![2.0, 4.0, 6.0, 8.0]);
/// # Ok(())
/// # }
/// ```
pub struct DeviceContext {
    id: ContextId,
    device: SimDevice,
    device_memory: Arc<TrackingAllocator>,
    host_memory: Arc<TrackingAllocator>,
    timeline: Timeline,
}

impl DeviceContext {
    /// Open a context on a device with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ContextConfig::default())
    }

    /// Open a context on the device described by `config`
    pub fn with_config(config: ContextConfig) -> Result<Self> {
        config.validate()?;

        let id = ContextId::new();
        let device = SimDevice::from_config(&config);
        let timeline = Timeline::spawn(format!("gridrt-timeline-{}", id.raw()), device.clone())?;

        tracing::info!(
            context = %id,
            device = %device.name(),
            workers = device.workers(),
            warp_size = device.warp_size(),
            memory_capacity = device.memory_capacity(),
            "device context created"
        );

        Ok(Self {
            id,
            device_memory: Arc::new(TrackingAllocator::with_capacity(device.memory_capacity())),
            host_memory: Arc::new(TrackingAllocator::unbounded()),
            device,
            timeline,
        })
    }

    /// Identifier recorded in every buffer this context allocates
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The device this context drives
    #[inline]
    pub fn device(&self) -> &SimDevice {
        &self.device
    }

    /// Device memory currently held by live buffers, in bytes
    pub fn allocated_bytes(&self) -> usize {
        self.device_memory.allocated_bytes()
    }

    /// Total device memory, in bytes
    pub fn memory_capacity(&self) -> usize {
        self.device_memory.capacity()
    }

    /// Operations enqueued but not yet completed
    pub fn pending_operations(&self) -> usize {
        self.timeline.pending() as usize
    }

    // ===== Allocation =====

    /// Allocate a zero-filled host buffer of `count` elements
    pub fn create_host_buffer<T: Element>(&self, count: usize) -> Result<Buffer<T>> {
        Buffer::allocate(
            count,
            MemoryLocation::Host,
            self.id,
            Arc::clone(&self.host_memory),
        )
    }

    /// Allocate a host buffer holding a copy of `data`
    pub fn create_host_buffer_from_slice<T: Element>(&self, data: &[T]) -> Result<Buffer<T>> {
        let buffer = self.create_host_buffer(data.len())?;
        buffer.write_from_slice(data)?;
        Ok(buffer)
    }

    /// Allocate a zero-filled device buffer of `count` elements
    ///
    /// Fails with `OutOfDeviceMemory` when the device cannot hold it.
    pub fn create_device_buffer<T: Element>(&self, count: usize) -> Result<Buffer<T>> {
        let buffer = Buffer::allocate(
            count,
            MemoryLocation::Device,
            self.id,
            Arc::clone(&self.device_memory),
        )?;
        tracing::debug!(
            context = %self.id,
            dtype = %T::DTYPE,
            count,
            allocated = self.allocated_bytes(),
            "device buffer allocated"
        );
        Ok(buffer)
    }

    // ===== Enqueued operations =====

    /// Enqueue a copy of every element of `src` into `dst`
    ///
    /// Element counts must match; nothing is enqueued otherwise.
    pub fn enqueue_copy<T: Element>(&self, dst: &Buffer<T>, src: &Buffer<T>) -> Result<()> {
        if dst.len() != src.len() {
            return Err(Error::size_mismatch(dst.len(), src.len()));
        }
        self.check_resident(dst)?;
        self.check_resident(src)?;

        tracing::debug!(
            context = %self.id,
            src = %src.location(),
            dst = %dst.location(),
            count = src.len(),
            "enqueue copy"
        );

        let (dst, src) = (dst.clone(), src.clone());
        self.submit(
            format!("copy {}->{}", src.location(), dst.location()),
            Box::new(move |_: &Executor| -> Result<()> {
                dst.copy_from(&src);
                Ok(())
            }),
        )
    }

    /// Enqueue a copy from `src` to `dst` (argument order of a host API call)
    pub fn enqueue_copy_to<T: Element>(&self, src: &Buffer<T>, dst: &Buffer<T>) -> Result<()> {
        self.enqueue_copy(dst, src)
    }

    /// Enqueue filling every element of `buffer` with `value`
    pub fn enqueue_memset<T: Element>(&self, buffer: &Buffer<T>, value: T) -> Result<()> {
        self.check_resident(buffer)?;

        tracing::debug!(
            context = %self.id,
            location = %buffer.location(),
            count = buffer.len(),
            "enqueue memset"
        );

        let buffer = buffer.clone();
        self.submit(
            "memset".to_string(),
            Box::new(move |_: &Executor| -> Result<()> {
                buffer.fill(value);
                Ok(())
            }),
        )
    }

    /// Enqueue one kernel launch
    ///
    /// The launch configuration is checked immediately; an invalid one is
    /// rejected with `InvalidLaunchConfiguration` and nothing is enqueued.
    /// A kernel thread that panics surfaces as `KernelFault` from the next
    /// [`synchronize`](Self::synchronize).
    pub fn enqueue_function<K: Kernel>(&self, kernel: K, config: LaunchConfig) -> Result<()> {
        config.validate(&self.device)?;

        tracing::debug!(
            context = %self.id,
            kernel = kernel.name(),
            grid = %config.grid_dim,
            block = %config.block_dim,
            shared_mem_bytes = config.shared_mem_bytes,
            cooperative = config.is_cooperative(),
            "enqueue launch"
        );

        self.submit(
            format!("launch {}", kernel.name()),
            Box::new(move |executor: &Executor| -> Result<()> {
                executor.launch(&kernel, &config)
            }),
        )
    }

    /// Wait until every operation enqueued so far has completed
    ///
    /// Returns the first failure among those operations, if any. Each failure
    /// is reported once: when several host threads synchronize at the same
    /// time, exactly one of them receives it and the others return `Ok`.
    pub fn synchronize(&self) -> Result<()> {
        let pending = self.pending_operations();
        let result = self.timeline.synchronize();
        tracing::debug!(context = %self.id, pending, ok = result.is_ok(), "synchronized");
        result
    }

    /// Reject device buffers allocated by another context
    pub(crate) fn check_resident<T: Element>(&self, buffer: &Buffer<T>) -> Result<()> {
        if buffer.location() == MemoryLocation::Device && buffer.context_id() != self.id {
            return Err(Error::CrossContext {
                lhs: self.id,
                rhs: buffer.context_id(),
            });
        }
        Ok(())
    }

    fn submit(&self, label: String, job: super::timeline::Job) -> Result<()> {
        self.timeline.submit(label, job).map(|_| ())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        tracing::info!(
            context = %self.id,
            pending = self.timeline.pending(),
            "device context shutting down"
        );
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}
