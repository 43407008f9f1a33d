//! Worker pool for parallel batch loading.
//!
//! Every worker owns a dedicated task channel and output channel. The loader
//! sends batch `k` to worker `k % num_workers` and reads it back from the same
//! worker, so batches come out in sampler order and each batch is always built
//! by the same worker (and the same RNG stream) for a given seed and epoch.
//!
//! # Key features
//! - Bounded channels cap memory at `num_workers x buffer_size` batches
//! - Graceful shutdown on drop
//! - Each worker thread records its id in `WORKER_ID`, read through
//!   `current_worker_id`

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::common::thread::WORKER_ID;

/// Thread pool with per-worker channels:
/// - Task channel: Main thread -> Worker `i`
/// - Output channel: Worker `i` -> Main thread
/// - Shutdown flag: Enables graceful termination
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<Task>>,
    output_rxs: Vec<Receiver<Output>>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn(worker_id, tasks, outputs, shutdown)`.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(usize, Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or use single-threaded mode."
            ));
        }
        if buffer_size == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with buffer_size 0. \
                Buffer size must be > 0 to prevent deadlocks."
            ));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut pool = Self {
            workers: Vec::with_capacity(num_workers),
            task_txs: Vec::with_capacity(num_workers),
            output_rxs: Vec::with_capacity(num_workers),
            shutdown: shutdown.clone(),
        };

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded(buffer_size);
            let (output_tx, output_rx) = bounded(buffer_size);
            let shutdown = shutdown.clone();
            let worker_fn = worker_fn.clone();

            // On spawn failure `pool` is dropped, which joins the workers started so far.
            let handle = thread::Builder::new()
                .name(format!("batch-worker-{}", worker_id))
                .spawn(move || {
                    WORKER_ID.with(|id| *id.borrow_mut() = worker_id);
                    worker_fn(worker_id, task_rx, output_tx, shutdown);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;

            pool.workers.push(handle);
            pool.task_txs.push(task_tx);
            pool.output_rxs.push(output_rx);
        }
        Ok(pool)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Queues a task on worker `worker_id`.
    pub(crate) fn send(&self, worker_id: usize, task: Task) -> Result<()> {
        self.task_txs[worker_id]
            .send(task)
            .map_err(|_| anyhow!("Worker {} is no longer accepting tasks", worker_id))
    }

    /// Waits up to `timeout` for the next output of worker `worker_id`.
    pub(crate) fn recv(&self, worker_id: usize, timeout: Duration) -> Result<Output> {
        match self.output_rxs[worker_id].recv_timeout(timeout) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "Timed out after {:?} waiting for worker {}",
                timeout,
                worker_id
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("Worker {} exited before delivering its batch", worker_id))
            }
        }
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // Closing both ends unblocks workers waiting on a task or an output slot.
        self.task_txs.clear();
        self.output_rxs.clear();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling_pool(num_workers: usize) -> Result<WorkerPool<u64, (usize, u64)>> {
        WorkerPool::new(num_workers, 2, |worker_id, tasks: Receiver<u64>, outputs, shutdown| {
            while let Ok(task) = tasks.recv() {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if outputs.send((worker_id, task * 2)).is_err() {
                    break;
                }
            }
        })
    }

    #[test]
    fn test_rejects_empty_pool() {
        assert!(doubling_pool(0).is_err());
        let zero_buffer = WorkerPool::<u64, u64>::new(2, 0, |_, _, _, _| {});
        assert!(zero_buffer.is_err());
    }

    #[test]
    fn test_round_robin_routing() -> Result<()> {
        let pool = doubling_pool(3)?;
        assert_eq!(pool.num_workers(), 3);

        for k in 0..6u64 {
            pool.send(k as usize % 3, k)?;
        }
        for k in 0..6u64 {
            let (worker_id, value) = pool.recv(k as usize % 3, Duration::from_secs(5))?;
            assert_eq!(worker_id, k as usize % 3);
            assert_eq!(value, k * 2);
        }
        Ok(())
    }

    #[test]
    fn test_recv_times_out_without_tasks() -> Result<()> {
        let pool = doubling_pool(1)?;
        assert!(pool.recv(0, Duration::from_millis(20)).is_err());
        Ok(())
    }
}
