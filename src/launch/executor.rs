//! Grid execution on the device timeline
//!
//! `run_grid` is generic over the kernel type, so every thread invocation is
//! a direct (inlinable) call. Blocks are spread over the context's block pool.
//! Threads of a serial block run in a loop on the pool worker that owns the
//! block.
//!
//! A cooperative block needs every logical thread parked at a barrier at the
//! same time, so each one gets a scoped OS thread. The pool's thread budget
//! caps how many of those exist at once to `max_threads_per_block`; blocks
//! that would exceed it wait for a running block to finish. A failed spawn
//! poisons the block and the launch ends in `KernelFault`.

use super::sync::BlockAborted;
use super::thread::{BlockResources, ThreadContext};
use super::{Kernel, LaunchConfig};
use crate::error::{Error, Result};
use crate::runtime::SimDevice;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Worker threads that execute the blocks of a launch
pub(crate) struct BlockPool {
    #[cfg(feature = "rayon")]
    pool: rayon::ThreadPool,
    cooperative: ThreadBudget,
}

impl BlockPool {
    pub(crate) fn new(device: &SimDevice) -> Result<Self> {
        #[cfg(feature = "rayon")]
        {
            let ordinal = device.ordinal();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(device.workers())
                .thread_name(move |i| format!("gridrt-{ordinal}-block-{i}"))
                .build()
                .map_err(|e| Error::Internal(format!("failed to build block pool: {e}")))?;
            Ok(Self {
                pool,
                cooperative: ThreadBudget::new(device.max_threads_per_block()),
            })
        }

        #[cfg(not(feature = "rayon"))]
        {
            Ok(Self {
                cooperative: ThreadBudget::new(device.max_threads_per_block()),
            })
        }
    }

    fn for_each_block<F>(&self, blocks: usize, run: F) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Send + Sync,
    {
        #[cfg(feature = "rayon")]
        {
            self.pool
                .install(|| (0..blocks).into_par_iter().try_for_each(&run))
        }

        #[cfg(not(feature = "rayon"))]
        {
            (0..blocks).try_for_each(run)
        }
    }
}

/// Counting limit on the OS threads held by cooperative blocks
struct ThreadBudget {
    limit: usize,
    in_use: Mutex<usize>,
    released: Condvar,
}

impl ThreadBudget {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            in_use: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Block until `threads` fit in the budget
    ///
    /// A request larger than the whole budget is granted once nothing else
    /// holds a share.
    fn acquire(&self, threads: usize) -> BudgetPermit<'_> {
        let mut in_use = self.in_use.lock();
        while *in_use > 0 && *in_use + threads > self.limit {
            self.released.wait(&mut in_use);
        }
        *in_use += threads;
        BudgetPermit {
            budget: self,
            threads,
        }
    }
}

struct BudgetPermit<'a> {
    budget: &'a ThreadBudget,
    threads: usize,
}

impl Drop for BudgetPermit<'_> {
    fn drop(&mut self) {
        *self.budget.in_use.lock() -= self.threads;
        self.budget.released.notify_all();
    }
}

/// Run every thread of a launch and wait for the grid to finish
///
/// The first panicking thread turns the launch into `KernelFault`; blocks not
/// yet started when the fault is seen may be skipped.
pub(crate) fn run_grid<K: Kernel>(
    kernel: &K,
    config: &LaunchConfig,
    device: &SimDevice,
    pool: &BlockPool,
) -> Result<()> {
    let warp_size = device.warp_size();
    let cooperative = config.is_cooperative();

    pool.for_each_block(config.num_blocks(), |block| {
        tracing::trace!(kernel = kernel.name(), block, "block start");

        let outcome = if cooperative {
            run_cooperative_block(kernel, config, block, warp_size, &pool.cooperative)
        } else {
            run_serial_block(kernel, config, block, warp_size)
        };

        outcome.map_err(|message| Error::KernelFault {
            kernel: kernel.name().to_string(),
            message,
        })
    })
}

fn run_serial_block<K: Kernel>(
    kernel: &K,
    config: &LaunchConfig,
    block: usize,
    warp_size: usize,
) -> std::result::Result<(), String> {
    let resources = BlockResources::serial(config.shared_mem_bytes);

    catch_unwind(AssertUnwindSafe(|| {
        for thread in 0..config.threads_per_block() {
            let ctx = ThreadContext::new(
                config.grid_dim,
                config.block_dim,
                block,
                thread,
                warp_size,
                &resources,
            );
            kernel.execute(&ctx);
        }
    }))
    .map_err(panic_message)
}

fn run_cooperative_block<K: Kernel>(
    kernel: &K,
    config: &LaunchConfig,
    block: usize,
    warp_size: usize,
    budget: &ThreadBudget,
) -> std::result::Result<(), String> {
    let threads = config.threads_per_block();
    let _permit = budget.acquire(threads);
    let resources = BlockResources::cooperative(config.shared_mem_bytes, threads, warp_size);
    let fault: Mutex<Option<String>> = Mutex::new(None);

    std::thread::scope(|s| {
        for thread in 0..threads {
            let resources = &resources;
            let fault = &fault;
            let spawned = std::thread::Builder::new().spawn_scoped(s, move || {
                let ctx = ThreadContext::new(
                    config.grid_dim,
                    config.block_dim,
                    block,
                    thread,
                    warp_size,
                    resources,
                );

                match catch_unwind(AssertUnwindSafe(|| kernel.execute(&ctx))) {
                    Ok(()) => resources.thread_exited(thread, warp_size),
                    Err(payload) => {
                        if !payload.is::<BlockAborted>() {
                            fault.lock().get_or_insert_with(|| panic_message(payload));
                        }
                        resources.poison();
                    }
                }
            });

            if let Err(e) = spawned {
                // Threads already running unwind out of their next barrier
                fault
                    .lock()
                    .get_or_insert_with(|| format!("failed to spawn thread {thread}: {e}"));
                resources.poison();
                break;
            }
        }
    });

    match fault.into_inner() {
        Some(message) => Err(message),
        None => Ok(()),
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}
