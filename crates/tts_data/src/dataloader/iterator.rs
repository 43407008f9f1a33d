//! src/dataloader/iterator.rs
//!
//! Iteration logic bridging the dataset, the batch order and the workers.
//!
//! # Iterator Variants
//! - `Single`: `num_workers = 0`, every batch is read and collated on the
//!   calling thread. The iterator owns its RNG and installs it only while a
//!   batch is collated, so iterators sharing a thread keep separate streams.
//! - `Multi`: a fresh `WorkerPool` per epoch. Batch `k` is routed to worker
//!   `k % num_workers` and received from that worker, so batches keep sampler
//!   order and the RNG stream behind each batch depends only on seed and epoch.
//!
//! Either way, the first error ends the epoch: it is yielded once and the
//! iterator then returns `None`.

use crate::collator::Collator;
use crate::dataset::Dataset;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use rand::rngs::StdRng;
use std::time::Duration;

use super::common::thread::{init_worker_rng, seeded_worker_rng, with_installed_rng};
use super::loader::DataLoader;
use super::pool::WorkerPool;

type BatchIndices<'a> = Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>;

/// Iterator over the batches of one epoch.
///
/// Created by calling `dataloader.iter()`.
pub struct DataLoaderIter<'a, D, C: Collator> {
    batch_indices: BatchIndices<'a>,
    inner: IteratorImpl<'a, D, C>,
    epoch: usize,
    finished: bool,
}

enum IteratorImpl<'a, D, C: Collator> {
    /// - `rng`: seeded like worker 0, installed only while collating
    Single {
        dataset: &'a D,
        collator: &'a C,
        rng: Option<StdRng>,
    },

    /// - `sent`: batches handed to workers so far
    /// - `received`: batches yielded so far
    /// - `max_in_flight`: `num_workers * prefetch_factor`
    /// - `sampler_exhausted`: all batches for this epoch have been sent
    Multi {
        pool: WorkerPool<Vec<usize>, Result<C::Batch>>,
        timeout: Duration,
        sent: usize,
        received: usize,
        max_in_flight: usize,
        sampler_exhausted: bool,
    },
}

impl<D, C> DataLoader<D, C>
where
    D: Dataset + 'static,
    C: Collator<Sample = D::Sample> + Send + Sync + 'static,
    C::Batch: Send + 'static,
{
    /// Creates an iterator over batches for the next epoch.
    ///
    /// Every call advances the epoch counter, which reseeds both the sampler
    /// order and the worker RNGs.
    pub fn iter(&self) -> Result<DataLoaderIter<'_, D, C>> {
        let epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst);
        let seed = self.runtime_seed;
        let num_workers = self.config.num_workers;
        let batch_indices = self.batch_sampler.iter(epoch);

        tracing::info!(
            epoch,
            batches = self.len(),
            num_workers,
            "Starting DataLoader epoch"
        );

        let inner = if num_workers == 0 {
            IteratorImpl::Single {
                dataset: self.dataset.as_ref(),
                collator: self.collator.as_ref(),
                rng: Some(seeded_worker_rng(0, epoch, seed)),
            }
        } else {
            let dataset = Arc::clone(&self.dataset);
            let collator = Arc::clone(&self.collator);
            let prefetch_factor = self.config.prefetch_factor;

            let pool = WorkerPool::new(
                num_workers,
                prefetch_factor,
                move |worker_id,
                      task_rx: Receiver<Vec<usize>>,
                      output_tx: Sender<Result<C::Batch>>,
                      shutdown: Arc<AtomicBool>| {
                    init_worker_rng(worker_id, epoch, seed);
                    tracing::debug!(worker_id, epoch, "Worker started");

                    while let Ok(indices) = task_rx.recv() {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        let result = load_batch(dataset.as_ref(), collator.as_ref(), &indices)
                            .with_context(|| {
                                format!(
                                    "Worker {} failed to process batch with {} indices",
                                    worker_id,
                                    indices.len()
                                )
                            });
                        if output_tx.send(result).is_err() {
                            break;
                        }
                    }
                    tracing::debug!(worker_id, epoch, "Worker exiting");
                },
            )
            .context("Failed to create worker pool")?;

            IteratorImpl::Multi {
                pool,
                timeout: self.config.timeout,
                sent: 0,
                received: 0,
                max_in_flight: num_workers * prefetch_factor,
                sampler_exhausted: false,
            }
        };

        Ok(DataLoaderIter {
            batch_indices,
            inner,
            epoch,
            finished: false,
        })
    }
}

/// Reads every index and collates the samples into one batch.
pub(crate) fn load_batch<D, C>(dataset: &D, collator: &C, indices: &[usize]) -> Result<C::Batch>
where
    D: Dataset,
    C: Collator<Sample = D::Sample>,
{
    let samples = indices
        .iter()
        .map(|&index| {
            dataset.get(index).with_context(|| {
                format!(
                    "Failed to load example {} ({})",
                    index,
                    dataset.id(index).unwrap_or("unknown id")
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    collator.collate(&samples)
}

impl<D, C> DataLoaderIter<'_, D, C>
where
    D: Dataset,
    C: Collator<Sample = D::Sample>,
    C::Batch: Send + 'static,
{
    fn next_batch(&mut self) -> Option<Result<C::Batch>> {
        match &mut self.inner {
            IteratorImpl::Single {
                dataset,
                collator,
                rng,
            } => {
                let indices = self.batch_indices.next()?;
                Some(with_installed_rng(rng, || {
                    load_batch(*dataset, *collator, &indices)
                }))
            }

            IteratorImpl::Multi {
                pool,
                timeout,
                sent,
                received,
                max_in_flight,
                sampler_exhausted,
            } => {
                let num_workers = pool.num_workers();

                // Keep every worker fed without exceeding its channel capacity.
                while !*sampler_exhausted && *sent - *received < *max_in_flight {
                    match self.batch_indices.next() {
                        Some(indices) => {
                            if let Err(e) = pool.send(*sent % num_workers, indices) {
                                return Some(Err(e));
                            }
                            *sent += 1;
                        }
                        None => *sampler_exhausted = true,
                    }
                }

                if *received == *sent {
                    return None;
                }

                let batch_index = *received;
                *received += 1;
                Some(
                    pool.recv(batch_index % num_workers, *timeout)
                        .with_context(|| format!("Failed to receive batch {}", batch_index))
                        .and_then(|result| result),
                )
            }
        }
    }
}

impl<D, C> Iterator for DataLoaderIter<'_, D, C>
where
    D: Dataset,
    C: Collator<Sample = D::Sample>,
    C::Batch: Send + 'static,
{
    type Item = Result<C::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_batch() {
            Some(Ok(batch)) => Some(Ok(batch)),
            Some(Err(e)) => {
                tracing::error!(epoch = self.epoch, error = %e, "DataLoader epoch aborted");
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}
