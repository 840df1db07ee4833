//! Launch grids, kernels and per-thread addressing
//!
//! A launch runs one [`Kernel`] once per logical thread of a grid. The grid
//! is `grid_dim` blocks, each of `block_dim` threads; both are three-axis
//! [`Dim3`] values with x varying fastest.
//!
//! ```text
//! grid (2, 1, 1) x block (4, 1, 1)
//!
//!   block 0: t0 t1 t2 t3     global_index = block_idx.x * block_dim.x + thread_idx.x
//!   block 1: t0 t1 t2 t3                  = 0..8
//! ```
//!
//! Each thread observes its coordinates through a [`ThreadContext`]. Threads
//! of one block may share scratch memory, meet at a block barrier and
//! exchange registers within a warp; blocks never communicate.

mod executor;
mod sync;
mod thread;

pub(crate) use executor::{BlockPool, panic_message, run_grid};
pub use thread::{GlobalId, SharedSlice, ThreadContext};

use crate::error::{Error, Result};
use crate::runtime::SimDevice;
use std::fmt;

/// Extent or coordinate along three axes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dim3 {
    /// Fastest-varying axis
    pub x: u32,
    /// Middle axis
    pub y: u32,
    /// Slowest-varying axis
    pub z: u32,
}

impl Dim3 {
    /// Unit extent
    pub const ONE: Self = Self::new(1, 1, 1);

    /// Origin coordinate
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Create a three-axis value
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Number of points in the extent
    #[inline]
    pub fn volume(self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }

    /// Returns true if any axis is zero
    #[inline]
    pub fn has_zero_axis(self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }

    /// Linear index of `coord` inside this extent, x fastest
    #[inline]
    pub fn linearize(self, coord: Dim3) -> usize {
        let (x, y) = (self.x as usize, self.y as usize);
        coord.x as usize + x * (coord.y as usize + y * coord.z as usize)
    }

    /// Coordinate of the `linear`-th point of this extent, x fastest
    #[inline]
    pub fn from_linear(self, linear: usize) -> Dim3 {
        let (x, y) = (self.x as usize, self.y as usize);
        Dim3 {
            x: (linear % x) as u32,
            y: ((linear / x) % y) as u32,
            z: (linear / (x * y)) as u32,
        }
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Self {
        Self::new(x, 1, 1)
    }
}

impl From<(u32, u32)> for Dim3 {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x, y, 1)
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Grid and block shape of one kernel launch
///
/// # Execution modes
///
/// A launch is *serial* unless it requests shared memory or is marked
/// [`cooperative`](Self::cooperative). Serial blocks run their threads one
/// after another on a single worker; cooperative blocks run every thread
/// concurrently so that [`ThreadContext::barrier`] and warp shuffles can
/// rendezvous. Block-level synchronization from a serial launch with more
/// than one thread per block is a kernel fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Blocks in the grid
    pub grid_dim: Dim3,
    /// Threads in each block
    pub block_dim: Dim3,
    /// Bytes of shared scratch memory given to every block
    pub shared_mem_bytes: usize,
    /// Run block threads concurrently even without shared memory
    pub cooperative: bool,
}

impl LaunchConfig {
    /// Launch of `grid` blocks with `block` threads each
    pub fn new(grid: impl Into<Dim3>, block: impl Into<Dim3>) -> Self {
        Self {
            grid_dim: grid.into(),
            block_dim: block.into(),
            shared_mem_bytes: 0,
            cooperative: false,
        }
    }

    /// One-dimensional launch
    pub fn linear(blocks: u32, threads_per_block: u32) -> Self {
        Self::new(blocks, threads_per_block)
    }

    /// Give every block `bytes` of shared memory
    pub fn with_shared_mem(mut self, bytes: usize) -> Self {
        self.shared_mem_bytes = bytes;
        self
    }

    /// Run block threads concurrently
    pub fn cooperative(mut self) -> Self {
        self.cooperative = true;
        self
    }

    /// Returns true if block threads run concurrently
    #[inline]
    pub fn is_cooperative(&self) -> bool {
        self.cooperative || self.shared_mem_bytes > 0
    }

    /// Number of blocks
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.grid_dim.volume()
    }

    /// Threads in each block
    #[inline]
    pub fn threads_per_block(&self) -> usize {
        self.block_dim.volume()
    }

    /// Threads in the whole grid
    #[inline]
    pub fn total_threads(&self) -> usize {
        self.num_blocks() * self.threads_per_block()
    }

    /// Every `(block_idx, thread_idx)` pair of the launch
    ///
    /// Blocks in linear order; within a block, threads in linear order.
    pub fn coordinates(&self) -> impl Iterator<Item = (Dim3, Dim3)> + '_ {
        let grid = self.grid_dim;
        let block = self.block_dim;
        (0..self.num_blocks()).flat_map(move |b| {
            let block_idx = grid.from_linear(b);
            (0..block.volume()).map(move |t| (block_idx, block.from_linear(t)))
        })
    }

    /// Check the launch against the device limits
    pub fn validate(&self, device: &SimDevice) -> Result<()> {
        if self.grid_dim.has_zero_axis() {
            return Err(Error::invalid_launch(format!(
                "grid_dim {} has a zero axis",
                self.grid_dim
            )));
        }
        if self.block_dim.has_zero_axis() {
            return Err(Error::invalid_launch(format!(
                "block_dim {} has a zero axis",
                self.block_dim
            )));
        }

        let threads = self.threads_per_block();
        if threads > device.max_threads_per_block() {
            return Err(Error::invalid_launch(format!(
                "block_dim {} has {threads} threads, device allows {}",
                self.block_dim,
                device.max_threads_per_block()
            )));
        }

        let total = (self.grid_dim.x as u64)
            .checked_mul(self.grid_dim.y as u64)
            .and_then(|v| v.checked_mul(self.grid_dim.z as u64))
            .and_then(|v| v.checked_mul(threads as u64))
            .filter(|&total| usize::try_from(total).is_ok());
        if total.is_none() {
            return Err(Error::invalid_launch(format!(
                "grid_dim {} x block_dim {} overflows the thread count",
                self.grid_dim, self.block_dim
            )));
        }

        if self.shared_mem_bytes > device.max_shared_mem_per_block() {
            return Err(Error::invalid_launch(format!(
                "{} bytes of shared memory requested, device allows {}",
                self.shared_mem_bytes,
                device.max_shared_mem_per_block()
            )));
        }

        Ok(())
    }
}

/// Work unit executed once per logical thread of a launch
///
/// Arguments are the kernel's own fields (or a closure's captures). Side
/// effects happen only through buffer, tensor view and shared memory writes.
///
/// Any `Fn(&ThreadContext)` closure is a kernel; use [`kernel`] to give one
/// a name for diagnostics.
pub trait Kernel: Send + Sync + 'static {
    /// Body run by every thread
    fn execute(&self, thread: &ThreadContext<'_>);

    /// Name used in logs and fault reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Kernel for F
where
    F: Fn(&ThreadContext<'_>) + Send + Sync + 'static,
{
    #[inline]
    fn execute(&self, thread: &ThreadContext<'_>) {
        self(thread)
    }
}

/// Closure kernel carrying a display name
pub struct NamedKernel<F> {
    name: String,
    body: F,
}

impl<F> Kernel for NamedKernel<F>
where
    F: Fn(&ThreadContext<'_>) + Send + Sync + 'static,
{
    #[inline]
    fn execute(&self, thread: &ThreadContext<'_>) {
        (self.body)(thread)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for NamedKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedKernel").field("name", &self.name).finish()
    }
}

/// Wrap a closure as a named kernel
///
/// # Example
/// ```
/// use gridrt::launch::{kernel, Kernel};
/// let k = kernel("noop", |_t| {});
/// assert_eq!(k.name(), "noop");
/// ```
pub fn kernel<F>(name: impl Into<String>, body: F) -> NamedKernel<F>
where
    F: Fn(&ThreadContext<'_>) + Send + Sync + 'static,
{
    NamedKernel {
        name: name.into(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use std::collections::HashSet;

    #[test]
    fn test_dim3_linearize_roundtrip() {
        let extent = Dim3::new(3, 4, 2);
        for linear in 0..extent.volume() {
            assert_eq!(extent.linearize(extent.from_linear(linear)), linear);
        }
        assert_eq!(extent.from_linear(5), Dim3::new(2, 1, 0));
        assert_eq!(extent.from_linear(12), Dim3::new(0, 0, 1));
    }

    #[test]
    fn test_dim3_from() {
        assert_eq!(Dim3::from(8), Dim3::new(8, 1, 1));
        assert_eq!(Dim3::from((2, 3)), Dim3::new(2, 3, 1));
        assert_eq!(Dim3::from((2, 3, 4)).volume(), 24);
        assert_eq!(Dim3::new(1, 2, 3).to_string(), "(1, 2, 3)");
    }

    #[test]
    fn test_coordinates_visit_each_pair_once() {
        let config = LaunchConfig::new((2, 2), (3, 1, 2));
        let seen: Vec<_> = config.coordinates().collect();
        assert_eq!(seen.len(), config.total_threads());
        assert_eq!(seen.len(), 24);

        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());
        assert_eq!(seen[0], (Dim3::ZERO, Dim3::ZERO));
        assert_eq!(seen[1], (Dim3::ZERO, Dim3::new(1, 0, 0)));
    }

    #[test]
    fn test_validate_rejects_zero_axis() {
        let device = SimDevice::default();
        for config in [
            LaunchConfig::new((0, 1), 4),
            LaunchConfig::new(1, (4, 0)),
            LaunchConfig::new((1, 1, 0), 1),
        ] {
            assert!(matches!(
                config.validate(&device),
                Err(Error::InvalidLaunchConfiguration { .. })
            ));
        }
        assert!(LaunchConfig::linear(4, 4).validate(&device).is_ok());
    }

    #[test]
    fn test_validate_device_limits() {
        let device = SimDevice::from_config(
            &ContextConfig::default()
                .with_max_threads_per_block(64)
                .with_max_shared_mem_per_block(256),
        );

        assert!(LaunchConfig::linear(1, 64).validate(&device).is_ok());
        assert!(LaunchConfig::linear(1, 65).validate(&device).is_err());
        assert!(
            LaunchConfig::linear(1, 8)
                .with_shared_mem(512)
                .validate(&device)
                .is_err()
        );
    }

    #[test]
    fn test_execution_mode() {
        let config = LaunchConfig::linear(1, 4);
        assert!(!config.is_cooperative());
        assert!(config.cooperative().is_cooperative());
        assert!(config.with_shared_mem(16).is_cooperative());
    }

    #[test]
    fn test_named_kernel() {
        let k = kernel("double", |_t| {});
        assert_eq!(k.name(), "double");
    }
}
