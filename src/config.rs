//! Device context configuration
//!
//! [`ContextConfig`] describes the simulated accelerator a
//! [`DeviceContext`](crate::runtime::DeviceContext) drives: how many workers
//! execute blocks, how much device memory exists, and the hardware limits
//! launches are validated against.
//!
//! # Environment Variables
//!
//! [`ContextConfig::from_env`] overlays these on the defaults:
//!
//! - `GRIDRT_WORKERS`: worker threads executing blocks (positive integer)
//! - `GRIDRT_MEMORY_LIMIT`: device memory capacity in bytes; accepts `K`, `M`, `G` suffixes
//! - `GRIDRT_WARP_SIZE`: lanes per warp (power of two)

use crate::error::{Error, Result};

/// Default device memory capacity (1 GiB)
pub const DEFAULT_MEMORY_CAPACITY: usize = 1 << 30;

/// Default number of lanes per warp
pub const DEFAULT_WARP_SIZE: usize = 32;

/// Default maximum threads per block
pub const DEFAULT_MAX_THREADS_PER_BLOCK: usize = 1024;

/// Default shared memory available to one block (48 KiB)
pub const DEFAULT_MAX_SHARED_MEM_PER_BLOCK: usize = 48 * 1024;

/// Configuration of one device context
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Ordinal of the simulated device
    pub ordinal: usize,
    /// Worker threads executing blocks; `None` uses one per available core
    pub workers: Option<usize>,
    /// Device memory capacity in bytes
    pub memory_capacity: usize,
    /// Lanes per warp
    pub warp_size: usize,
    /// Upper bound on threads in one block
    pub max_threads_per_block: usize,
    /// Upper bound on `shared_mem_bytes` of one launch
    pub max_shared_mem_per_block: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ordinal: 0,
            workers: None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            warp_size: DEFAULT_WARP_SIZE,
            max_threads_per_block: DEFAULT_MAX_THREADS_PER_BLOCK,
            max_shared_mem_per_block: DEFAULT_MAX_SHARED_MEM_PER_BLOCK,
        }
    }
}

impl ContextConfig {
    /// Defaults overlaid with the `GRIDRT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("GRIDRT_WORKERS") {
            config.workers = Some(parse_count("GRIDRT_WORKERS", &raw)?);
        }
        if let Some(raw) = lookup("GRIDRT_MEMORY_LIMIT") {
            config.memory_capacity = parse_bytes("GRIDRT_MEMORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("GRIDRT_WARP_SIZE") {
            config.warp_size = parse_count("GRIDRT_WARP_SIZE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the device ordinal
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Set the number of block worker threads
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the device memory capacity in bytes
    pub fn with_memory_capacity(mut self, bytes: usize) -> Self {
        self.memory_capacity = bytes;
        self
    }

    /// Set the warp size
    pub fn with_warp_size(mut self, lanes: usize) -> Self {
        self.warp_size = lanes;
        self
    }

    /// Set the maximum threads per block
    pub fn with_max_threads_per_block(mut self, threads: usize) -> Self {
        self.max_threads_per_block = threads;
        self
    }

    /// Set the maximum shared memory per block in bytes
    pub fn with_max_shared_mem_per_block(mut self, bytes: usize) -> Self {
        self.max_shared_mem_per_block = bytes;
        self
    }

    /// Check the configuration for values no device could have
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::invalid_argument("workers", "must be at least 1"));
        }
        if self.warp_size == 0 || !self.warp_size.is_power_of_two() {
            return Err(Error::invalid_argument(
                "warp_size",
                format!("must be a power of two, got {}", self.warp_size),
            ));
        }
        if self.max_threads_per_block == 0 {
            return Err(Error::invalid_argument(
                "max_threads_per_block",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &'static str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| Error::invalid_argument(key, format!("'{raw}': {e}")))
}

fn parse_bytes(key: &'static str, raw: &str) -> Result<usize> {
    let trimmed = raw.trim();
    let (digits, scale) = match trimmed.char_indices().last() {
        Some((i, 'k' | 'K')) => (&trimmed[..i], 1usize << 10),
        Some((i, 'm' | 'M')) => (&trimmed[..i], 1 << 20),
        Some((i, 'g' | 'G')) => (&trimmed[..i], 1 << 30),
        _ => (trimmed, 1),
    };

    let value = digits
        .trim()
        .parse::<usize>()
        .map_err(|e| Error::invalid_argument(key, format!("'{raw}': {e}")))?;

    value
        .checked_mul(scale)
        .ok_or_else(|| Error::invalid_argument(key, format!("'{raw}' overflows usize")))
}
