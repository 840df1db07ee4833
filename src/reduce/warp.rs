//! Warp-shuffle block reduction

use super::Combiner;
use crate::dtype::Element;
use crate::launch::{Kernel, LaunchConfig, ThreadContext};
use crate::runtime::Buffer;
use crate::tensor::TensorView;

/// Reduce `value` across the lanes of the calling thread's warp
///
/// Performs `log2` halving-offset `shuffle_down` steps, padding with the
/// combiner's identity. The warp's result ends up in lane 0; other lanes hold
/// partial results. Every lane of the warp must call this.
pub fn warp_reduce<T, C>(thread: &ThreadContext<'_>, value: T, combiner: C) -> T
where
    T: Element,
    C: Combiner<T>,
{
    let identity = combiner.identity();
    let mut acc = value;
    let mut offset = thread.warp_width().next_power_of_two() / 2;
    while offset > 0 {
        let other = thread.shuffle_down_or(acc, offset, identity);
        acc = combiner.combine(acc, other);
        offset /= 2;
    }
    acc
}

/// Each warp reduces its lanes with `shuffle_down`; with more than one warp
/// per block, lane 0 of every warp stages its partial in shared memory and
/// the first warp reduces the partials.
pub struct WarpShuffleReduce<T: Element, C: Combiner<T>> {
    input: TensorView<T>,
    output: Buffer<T>,
    combiner: C,
}

impl<T: Element, C: Combiner<T>> WarpShuffleReduce<T, C> {
    /// Reduce `input[b, ..]` into `output[b]`
    pub fn new(input: TensorView<T>, output: Buffer<T>, combiner: C) -> Self {
        Self {
            input,
            output,
            combiner,
        }
    }

    /// Cooperative `blocks` x `threads` launch with one shared slot per warp
    /// when a block spans several warps
    pub fn launch_config(blocks: u32, threads: u32, warp_size: usize) -> LaunchConfig {
        let warps = (threads as usize).div_ceil(warp_size);
        let shared = if warps > 1 {
            warps * std::mem::size_of::<T>()
        } else {
            0
        };
        LaunchConfig::linear(blocks, threads)
            .with_shared_mem(shared)
            .cooperative()
    }
}

impl<T: Element, C: Combiner<T>> Kernel for WarpShuffleReduce<T, C> {
    fn execute(&self, thread: &ThreadContext<'_>) {
        let block = thread.block_linear();
        let tid = thread.thread_linear();
        let value = self.input.get(&[block, tid]);

        let partial = warp_reduce(thread, value, self.combiner);

        let warps = thread.threads_per_block().div_ceil(thread.warp_size());
        if warps == 1 {
            if tid == 0 {
                self.output.store(block, partial);
            }
            return;
        }

        let partials = thread.shared::<T>();
        if thread.lane_id() == 0 {
            partials.store(thread.warp_id(), partial);
        }
        thread.barrier();

        if thread.warp_id() == 0 {
            let mut acc = self.combiner.identity();
            let mut w = thread.lane_id();
            while w < warps {
                acc = self.combiner.combine(acc, partials.load(w));
                w += thread.warp_width();
            }

            let total = warp_reduce(thread, acc, self.combiner);
            if tid == 0 {
                self.output.store(block, total);
            }
        }
    }

    fn name(&self) -> &str {
        "warp_shuffle_reduce"
    }
}
