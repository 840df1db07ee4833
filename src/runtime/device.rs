//! Simulated accelerator description

use crate::config::ContextConfig;

/// Software accelerator driven by a [`DeviceContext`](super::DeviceContext)
///
/// Holds the hardware limits launches are checked against. Blocks run on a
/// pool of `workers` host threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimDevice {
    ordinal: usize,
    workers: usize,
    warp_size: usize,
    max_threads_per_block: usize,
    max_shared_mem_per_block: usize,
    memory_capacity: usize,
}

impl SimDevice {
    /// Build the device a configuration describes
    pub fn from_config(config: &ContextConfig) -> Self {
        let workers = config.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        Self {
            ordinal: config.ordinal,
            workers,
            warp_size: config.warp_size,
            max_threads_per_block: config.max_threads_per_block,
            max_shared_mem_per_block: config.max_shared_mem_per_block,
            memory_capacity: config.memory_capacity,
        }
    }

    /// Device ordinal
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Name used in logs, `sim:<ordinal>`
    pub fn name(&self) -> String {
        format!("sim:{}", self.ordinal)
    }

    /// Host threads executing blocks
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Lanes per warp
    #[inline]
    pub fn warp_size(&self) -> usize {
        self.warp_size
    }

    /// Upper bound on threads in one block
    #[inline]
    pub fn max_threads_per_block(&self) -> usize {
        self.max_threads_per_block
    }

    /// Upper bound on shared memory requested by one launch
    #[inline]
    pub fn max_shared_mem_per_block(&self) -> usize {
        self.max_shared_mem_per_block
    }

    /// Device memory capacity in bytes
    #[inline]
    pub fn memory_capacity(&self) -> usize {
        self.memory_capacity
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}
