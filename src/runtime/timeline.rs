//! Device timeline: one worker thread draining a FIFO command queue
//!
//! Every enqueued operation gets a sequence number. The worker runs
//! operations strictly in sequence order and publishes its progress;
//! `synchronize` waits until everything submitted before the call has
//! completed and then reports the first failure among those operations.

use super::SimDevice;
use crate::error::{Error, Result};
use crate::launch::{BlockPool, Kernel, LaunchConfig, run_grid};
use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

/// Type-erased operation queued on a timeline
pub(crate) type Job = Box<dyn FnOnce(&Executor) -> Result<()> + Send>;

enum Command {
    Run { seq: u64, label: String, job: Job },
    Shutdown,
}

/// Device-side state handed to every job
pub(crate) struct Executor {
    device: SimDevice,
    blocks: BlockPool,
}

impl Executor {
    /// Execute a whole launch
    pub(crate) fn launch<K: Kernel>(&self, kernel: &K, config: &LaunchConfig) -> Result<()> {
        run_grid(kernel, config, &self.device, &self.blocks)
    }
}

struct Progress {
    submitted: u64,
    completed: u64,
    fault: Option<(u64, Error)>,
}

struct Shared {
    progress: Mutex<Progress>,
    advanced: Condvar,
}

pub(crate) struct Timeline {
    sender: Sender<Command>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Timeline {
    pub(crate) fn spawn(name: String, device: SimDevice) -> Result<Self> {
        let blocks = BlockPool::new(&device)?;
        let executor = Executor { device, blocks };
        let shared = Arc::new(Shared {
            progress: Mutex::new(Progress {
                submitted: 0,
                completed: 0,
                fault: None,
            }),
            advanced: Condvar::new(),
        });
        let (sender, receiver) = mpsc::channel();

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(receiver, executor, worker_shared))
            .map_err(|e| Error::Internal(format!("failed to spawn device timeline: {e}")))?;

        Ok(Self {
            sender,
            shared,
            worker: Some(worker),
        })
    }

    /// Append an operation to the queue and return its sequence number
    pub(crate) fn submit(&self, label: String, job: Job) -> Result<u64> {
        // Sequence assignment and send happen under one lock so that
        // sequence order is queue order across host threads.
        let mut progress = self.shared.progress.lock();
        let seq = progress.submitted + 1;
        self.sender
            .send(Command::Run { seq, label, job })
            .map_err(|_| Error::Internal("device timeline has shut down".to_string()))?;
        progress.submitted = seq;
        Ok(seq)
    }

    /// Block until every operation submitted so far has completed
    ///
    /// The recorded fault is taken by whichever waiter reaches it first.
    pub(crate) fn synchronize(&self) -> Result<()> {
        let mut progress = self.shared.progress.lock();
        let target = progress.submitted;
        while progress.completed < target {
            self.shared.advanced.wait(&mut progress);
        }

        match progress.fault.take_if(|(seq, _)| *seq <= target) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    /// Operations submitted but not yet completed
    pub(crate) fn pending(&self) -> u64 {
        let progress = self.shared.progress.lock();
        progress.submitted - progress.completed
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("device timeline worker panicked");
            }
        }

        if let Some((seq, err)) = self.shared.progress.lock().fault.take() {
            tracing::warn!(seq, error = %err, "unreported device fault dropped with its context");
        }
    }
}

fn worker_loop(receiver: Receiver<Command>, executor: Executor, shared: Arc<Shared>) {
    while let Ok(command) = receiver.recv() {
        let (seq, label, job) = match command {
            Command::Run { seq, label, job } => (seq, label, job),
            Command::Shutdown => break,
        };

        tracing::trace!(seq, op = %label, "executing");
        let result = match catch_unwind(AssertUnwindSafe(|| job(&executor))) {
            Ok(result) => result,
            Err(payload) => Err(Error::Internal(format!(
                "operation '{label}' panicked: {}",
                crate::launch::panic_message(payload)
            ))),
        };

        let mut progress = shared.progress.lock();
        if let Err(err) = result {
            tracing::warn!(seq, op = %label, error = %err, "device operation failed");
            if progress.fault.is_none() {
                progress.fault = Some((seq, err));
            }
        }
        progress.completed = seq;
        shared.advanced.notify_all();
    }
}
