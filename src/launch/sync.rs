//! Block-scoped synchronization for cooperative launches

use crate::dtype::Element;
use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::panic::resume_unwind;

/// Unwind payload for threads released from a barrier because a peer faulted
#[derive(Debug)]
pub(crate) struct BlockAborted;

struct BarrierState {
    participants: usize,
    arrived: usize,
    generation: u64,
    poisoned: bool,
}

/// Reusable barrier for the threads of one block (or one warp)
///
/// Threads that finish the kernel [`leave`](Self::leave) the barrier, so a
/// barrier reached by fewer than all threads still releases once every
/// remaining thread has arrived. Once poisoned, every current and future
/// waiter unwinds with [`BlockAborted`].
pub(crate) struct BlockBarrier {
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl BlockBarrier {
    pub(crate) fn new(participants: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                participants,
                arrived: 0,
                generation: 0,
                poisoned: false,
            }),
            released: Condvar::new(),
        }
    }

    pub(crate) fn wait(&self) {
        let mut state = self.state.lock();
        if state.poisoned {
            drop(state);
            resume_unwind(Box::new(BlockAborted));
        }

        state.arrived += 1;
        if state.arrived >= state.participants {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return;
        }

        let generation = state.generation;
        while state.generation == generation && !state.poisoned {
            self.released.wait(&mut state);
        }

        if state.generation == generation {
            drop(state);
            resume_unwind(Box::new(BlockAborted));
        }
    }

    /// Remove one participant for good
    pub(crate) fn leave(&self) {
        let mut state = self.state.lock();
        state.participants = state.participants.saturating_sub(1);
        if state.arrived > 0 && state.arrived >= state.participants {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
        }
    }

    pub(crate) fn poison(&self) {
        let mut state = self.state.lock();
        state.poisoned = true;
        self.released.notify_all();
    }
}

/// Register exchange between the lanes of one warp
///
/// Every lane publishes a value into its slot, the warp meets at a barrier,
/// each lane reads the slot it asked for, and the warp meets again before the
/// slots can be reused.
pub(crate) struct WarpExchange {
    slots: Box<[UnsafeCell<u64>]>,
    barrier: BlockBarrier,
}

// SAFETY: a slot is written only by its own lane, and only between the two
// barrier waits that separate it from every read of it.
unsafe impl Sync for WarpExchange {}

impl WarpExchange {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            slots: (0..width).map(|_| UnsafeCell::new(0)).collect(),
            barrier: BlockBarrier::new(width),
        }
    }

    /// Active lanes in this warp
    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.slots.len()
    }

    /// Publish `value` from `lane` and read the value of `src_lane`
    ///
    /// Returns `None` if `src_lane` is outside the warp.
    pub(crate) fn exchange<T: Element>(&self, lane: usize, value: T, src_lane: usize) -> Option<T> {
        // SAFETY: only `lane` writes this slot, outside the read window
        unsafe { *self.slots[lane].get() = encode(value) };
        self.barrier.wait();

        let received = if src_lane < self.width() {
            // SAFETY: all lanes have written and none writes until the next wait
            Some(decode::<T>(unsafe { *self.slots[src_lane].get() }))
        } else {
            None
        };

        self.barrier.wait();
        received
    }

    pub(crate) fn leave(&self) {
        self.barrier.leave();
    }

    pub(crate) fn poison(&self) {
        self.barrier.poison();
    }
}

fn encode<T: Element>(value: T) -> u64 {
    let mut bits = 0u64;
    let bytes = bytemuck::bytes_of(&value);
    bytemuck::bytes_of_mut(&mut bits)[..bytes.len()].copy_from_slice(bytes);
    bits
}

fn decode<T: Element>(bits: u64) -> T {
    bytemuck::pod_read_unaligned(&bytemuck::bytes_of(&bits)[..std::mem::size_of::<T>()])
}
