//! Worker pool for parallel sample loading.
//!
//! Every worker owns a bounded task channel and the main thread routes each
//! task to a fixed worker. Since a worker's RNG is seeded from its ID, a
//! given batch is always augmented by the same random stream, whatever the
//! thread timing.
//!
//! # Key features
//! - Bounded channels prevent memory bloat
//! - Graceful shutdown on drop
//! - Thread-local worker IDs for seeding and debugging

use anyhow::{ensure, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::thread::WORKER_ID;

/// Thread pool with per-worker task channels and one shared output channel.
///
/// # Type Parameters
/// - `Task`: Work items sent to workers
/// - `Output`: Results returned from workers
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<Task>>,
    pub(crate) output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn`.
    ///
    /// `worker_fn` receives the worker's task receiver, the shared output
    /// sender and the shutdown flag; `WORKER_ID` is set before it runs.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        ensure!(
            num_workers > 0,
            "Cannot create WorkerPool with 0 workers. \
             Either set num_workers > 0 or use single-threaded mode."
        );
        ensure!(
            buffer_size > 0,
            "Cannot create WorkerPool with buffer_size 0. \
             Buffer size must be > 0 to prevent deadlocks."
        );

        let (output_tx, output_rx) = bounded(buffer_size * num_workers);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);
        let mut task_txs = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded(buffer_size);
            task_txs.push(task_tx);

            let output_tx = output_tx.clone();
            let shutdown_clone = shutdown.clone();
            let worker_fn_clone = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("dataloader-worker-{}", worker_id))
                .spawn(move || {
                    WORKER_ID.with(|id| *id.borrow_mut() = worker_id);
                    worker_fn_clone(task_rx, output_tx, shutdown_clone);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;
            workers.push(handle);
        }
        log::debug!("spawned {} loader workers", num_workers);

        Ok(Self {
            workers,
            task_txs,
            output_rx,
            shutdown,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.task_txs.len()
    }

    /// Blocks until `worker_id` has room for the task.
    pub(crate) fn send(&self, worker_id: usize, task: Task) -> Result<()> {
        let tx = self
            .task_txs
            .get(worker_id)
            .with_context(|| format!("No worker with id {}", worker_id))?;
        tx.send(task)
            .map_err(|_| anyhow::anyhow!("Worker {} channel closed", worker_id))
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Drop all task senders to close channels
        self.task_txs.clear();

        // Wait for workers to finish
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
