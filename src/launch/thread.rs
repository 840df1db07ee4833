//! Per-thread view of a running launch

use super::Dim3;
use super::sync::{BlockBarrier, WarpExchange};
use crate::dtype::Element;
use std::cell::UnsafeCell;
use std::marker::PhantomData;

#[repr(C, align(64))]
struct CacheLine([u8; 64]);

/// Shared scratch memory of one block, 64-byte aligned
pub(crate) struct ScratchArena {
    lines: Box<[UnsafeCell<CacheLine>]>,
    bytes: usize,
}

// SAFETY: the arena hands out raw element slots; ordering between threads of
// a block is established by the block barrier.
unsafe impl Sync for ScratchArena {}

impl ScratchArena {
    pub(crate) fn new(bytes: usize) -> Self {
        let lines = bytes.div_ceil(64);
        Self {
            lines: (0..lines)
                .map(|_| UnsafeCell::new(CacheLine([0; 64])))
                .collect(),
            bytes,
        }
    }

    fn as_mut_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.lines.as_ptr()).cast::<u8>()
    }
}

/// Typed window onto a block's shared memory
///
/// Obtained from [`ThreadContext::shared`]. Every thread of the block sees
/// the same elements; use [`ThreadContext::barrier`] to order writes before
/// reads from other threads. Contents are unspecified before the first write.
#[derive(Clone, Copy)]
pub struct SharedSlice<'a, T: Element> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a T>,
}

impl<T: Element> SharedSlice<'_, T> {
    /// Number of `T` slots
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the block has no shared memory
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read slot `index`
    #[inline]
    pub fn load(&self, index: usize) -> T {
        assert!(
            index < self.len,
            "shared memory index {index} out of bounds ({} slots)",
            self.len
        );
        // SAFETY: in bounds, arena outlives 'a
        unsafe { self.ptr.add(index).read() }
    }

    /// Write slot `index`
    #[inline]
    pub fn store(&self, index: usize, value: T) {
        assert!(
            index < self.len,
            "shared memory index {index} out of bounds ({} slots)",
            self.len
        );
        // SAFETY: in bounds, arena outlives 'a
        unsafe { self.ptr.add(index).write(value) }
    }
}

/// Resources shared by the threads of one block
pub(crate) struct BlockResources {
    pub(crate) shared: ScratchArena,
    barrier: Option<BlockBarrier>,
    warps: Vec<WarpExchange>,
}

impl BlockResources {
    /// Block whose threads run one after another
    pub(crate) fn serial(shared_bytes: usize) -> Self {
        Self {
            shared: ScratchArena::new(shared_bytes),
            barrier: None,
            warps: Vec::new(),
        }
    }

    /// Block whose threads run concurrently
    pub(crate) fn cooperative(shared_bytes: usize, threads: usize, warp_size: usize) -> Self {
        let warps = (0..threads.div_ceil(warp_size))
            .map(|w| WarpExchange::new(warp_size.min(threads - w * warp_size)))
            .collect();

        Self {
            shared: ScratchArena::new(shared_bytes),
            barrier: Some(BlockBarrier::new(threads)),
            warps,
        }
    }

    /// Thread `thread_linear` finished the kernel body
    pub(crate) fn thread_exited(&self, thread_linear: usize, warp_size: usize) {
        if let Some(barrier) = &self.barrier {
            barrier.leave();
        }
        if let Some(warp) = self.warps.get(thread_linear / warp_size) {
            warp.leave();
        }
    }

    /// Release every waiter after a fault
    pub(crate) fn poison(&self) {
        if let Some(barrier) = &self.barrier {
            barrier.poison();
        }
        for warp in &self.warps {
            warp.poison();
        }
    }
}

/// Cross-axis global coordinate of a thread
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId {
    /// `block_idx.x * block_dim.x + thread_idx.x`
    pub x: usize,
    /// `block_idx.y * block_dim.y + thread_idx.y`
    pub y: usize,
    /// `block_idx.z * block_dim.z + thread_idx.z`
    pub z: usize,
}

/// What one logical thread sees while executing a kernel
pub struct ThreadContext<'a> {
    block_idx: Dim3,
    thread_idx: Dim3,
    block_dim: Dim3,
    grid_dim: Dim3,
    block_linear: usize,
    thread_linear: usize,
    warp_size: usize,
    block: &'a BlockResources,
}

impl<'a> ThreadContext<'a> {
    pub(crate) fn new(
        grid_dim: Dim3,
        block_dim: Dim3,
        block_linear: usize,
        thread_linear: usize,
        warp_size: usize,
        block: &'a BlockResources,
    ) -> Self {
        Self {
            block_idx: grid_dim.from_linear(block_linear),
            thread_idx: block_dim.from_linear(thread_linear),
            block_dim,
            grid_dim,
            block_linear,
            thread_linear,
            warp_size,
            block,
        }
    }

    /// Coordinate of this thread's block in the grid
    #[inline]
    pub fn block_idx(&self) -> Dim3 {
        self.block_idx
    }

    /// Coordinate of this thread in its block
    #[inline]
    pub fn thread_idx(&self) -> Dim3 {
        self.thread_idx
    }

    /// Threads per block along each axis
    #[inline]
    pub fn block_dim(&self) -> Dim3 {
        self.block_dim
    }

    /// Blocks in the grid along each axis
    #[inline]
    pub fn grid_dim(&self) -> Dim3 {
        self.grid_dim
    }

    /// One-dimensional global index: `block_idx.x * block_dim.x + thread_idx.x`
    #[inline]
    pub fn global_index(&self) -> usize {
        self.block_idx.x as usize * self.block_dim.x as usize + self.thread_idx.x as usize
    }

    /// Global coordinate, each axis linearized independently
    #[inline]
    pub fn global_id(&self) -> GlobalId {
        let axis = |b: u32, d: u32, t: u32| b as usize * d as usize + t as usize;
        GlobalId {
            x: axis(self.block_idx.x, self.block_dim.x, self.thread_idx.x),
            y: axis(self.block_idx.y, self.block_dim.y, self.thread_idx.y),
            z: axis(self.block_idx.z, self.block_dim.z, self.thread_idx.z),
        }
    }

    /// Linear index of the block in the grid, x fastest
    #[inline]
    pub fn block_linear(&self) -> usize {
        self.block_linear
    }

    /// Linear index of the thread in its block, x fastest
    #[inline]
    pub fn thread_linear(&self) -> usize {
        self.thread_linear
    }

    /// Linear index of the thread in the whole grid
    #[inline]
    pub fn global_linear(&self) -> usize {
        self.block_linear * self.threads_per_block() + self.thread_linear
    }

    /// Threads in this block
    #[inline]
    pub fn threads_per_block(&self) -> usize {
        self.block_dim.volume()
    }

    /// Lanes per warp on this device
    #[inline]
    pub fn warp_size(&self) -> usize {
        self.warp_size
    }

    /// Warp index of this thread in its block
    #[inline]
    pub fn warp_id(&self) -> usize {
        self.thread_linear / self.warp_size
    }

    /// Lane of this thread in its warp
    #[inline]
    pub fn lane_id(&self) -> usize {
        self.thread_linear % self.warp_size
    }

    /// Lanes actually present in this thread's warp
    ///
    /// Smaller than [`warp_size`](Self::warp_size) for the last warp of a
    /// block whose thread count is not a multiple of the warp size.
    #[inline]
    pub fn warp_width(&self) -> usize {
        self.warp_size
            .min(self.threads_per_block() - self.warp_id() * self.warp_size)
    }

    /// Wait until every thread of the block reaches this barrier
    ///
    /// Writes made before the barrier (to shared memory or buffers) are
    /// visible to every thread of the block after it.
    pub fn barrier(&self) {
        match &self.block.barrier {
            Some(barrier) => barrier.wait(),
            None if self.threads_per_block() == 1 => {}
            None => panic!("barrier() requires a cooperative launch"),
        }
    }

    /// Block shared memory viewed as `T` slots
    pub fn shared<T: Element>(&self) -> SharedSlice<'a, T> {
        let arena = &self.block.shared;
        SharedSlice {
            ptr: arena.as_mut_ptr().cast::<T>(),
            len: arena.bytes / std::mem::size_of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Read `value` from the lane `offset` positions higher in the warp
    ///
    /// Lanes whose source falls outside the warp receive `T::zero()`. Every
    /// lane of the warp must make the same call.
    #[inline]
    pub fn shuffle_down<T: Element>(&self, value: T, offset: usize) -> T {
        self.shuffle_down_or(value, offset, T::zero())
    }

    /// Like [`shuffle_down`](Self::shuffle_down) with an explicit fill value
    pub fn shuffle_down_or<T: Element>(&self, value: T, offset: usize, fill: T) -> T {
        let lane = self.lane_id();
        let src = lane + offset;

        match self.block.warps.get(self.warp_id()) {
            Some(warp) => warp.exchange(lane, value, src).unwrap_or(fill),
            None if self.threads_per_block() == 1 => {
                if offset == 0 {
                    value
                } else {
                    fill
                }
            }
            None => panic!("shuffle_down() requires a cooperative launch"),
        }
    }
}
