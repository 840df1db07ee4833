//! Shared-memory block reduction

use super::Combiner;
use crate::dtype::Element;
use crate::launch::{Kernel, LaunchConfig, ThreadContext};
use crate::runtime::Buffer;
use crate::tensor::TensorView;

/// Every thread stores its value in shared scratch; after the block barrier
/// thread 0 folds the scratch serially and writes the block result.
pub struct SharedMemoryReduce<T: Element, C: Combiner<T>> {
    input: TensorView<T>,
    output: Buffer<T>,
    combiner: C,
}

impl<T: Element, C: Combiner<T>> SharedMemoryReduce<T, C> {
    /// Reduce `input[b, ..]` into `output[b]`
    pub fn new(input: TensorView<T>, output: Buffer<T>, combiner: C) -> Self {
        Self {
            input,
            output,
            combiner,
        }
    }

    /// Cooperative `blocks` x `threads` launch with one scratch slot per thread
    pub fn launch_config(blocks: u32, threads: u32) -> LaunchConfig {
        LaunchConfig::linear(blocks, threads)
            .with_shared_mem(threads as usize * std::mem::size_of::<T>())
            .cooperative()
    }
}

impl<T: Element, C: Combiner<T>> Kernel for SharedMemoryReduce<T, C> {
    fn execute(&self, thread: &ThreadContext<'_>) {
        let block = thread.block_linear();
        let tid = thread.thread_linear();
        let scratch = thread.shared::<T>();

        scratch.store(tid, self.input.get(&[block, tid]));
        thread.barrier();

        if tid == 0 {
            let mut acc = self.combiner.identity();
            for i in 0..thread.threads_per_block() {
                acc = self.combiner.combine(acc, scratch.load(i));
            }
            self.output.store(block, acc);
        }
    }

    fn name(&self) -> &str {
        "shared_memory_reduce"
    }
}
