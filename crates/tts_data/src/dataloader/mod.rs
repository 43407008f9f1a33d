//! src/dataloader/mod.rs
//!
//! This module implements the `DataLoader`.
//!
//! The `DataLoader` coordinates a `Dataset`, a `Sampler` and a `Collator` to
//! turn a corpus of feature files into training batches, optionally reading
//! and collating on worker threads.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌─────────┐
//!                    │ Dataset │ (VocoderDataset or TtsDataset)
//!                    └────┬────┘
//!                         │ reads mel / quant / text per index
//!                         ↓
//!                    ┌─────────┐
//!                    │ Sampler │ (sequential, random or length-binned)
//!                    └────┬────┘
//!                         │ provides indices/order
//!                         ↓
//!                  ┌──────────────┐
//!                  │  DataLoader  │ ←───── Config (batch_size, workers, etc.)
//!                  └──────┬───────┘
//!                         │ coordinates everything
//!                         ↓
//!                   [Worker Threads] (optional parallelism)
//!                         │
//!                         ↓
//!                    ┌──────────┐
//!                    │ Collator │ (crops or pads samples into a batch)
//!                    └────┬─────┘
//!                         ↓
//!               VocoderBatch / TtsBatch / UtteranceBatch
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs             # Public API exports
//! ├── config.rs          # DataLoaderConfig and builder
//! ├── loader.rs          # DataLoader struct and constructors
//! ├── iterator.rs        # DataLoaderIter, single-threaded and worker modes
//! ├── pool.rs            # Generic `WorkerPool<Task, Output>`
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs      # Thread-local worker id and RNG
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! let dataset = TtsDataset::new(root, ids, texts, encoder);
//! let sampler = BinnedLengthSampler::new(&lengths, 32, None, seed)?;
//! let config = DataLoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(1)
//!     .seed(seed)
//!     .build();
//!
//! let loader = DataLoader::with_sampler(dataset, sampler, TtsCollator::new(1)?, config)?;
//! for batch in loader.iter()? {
//!     let batch: TtsBatch = batch?;
//! }
//! ```
//!
//! # Performance Guidelines
//! - `num_workers = 0`: Single-threaded, lowest memory usage but no parallelism
//! - `num_workers > 0`: Fresh worker threads per epoch
//! - Multi-threaded memory: O(num_workers x prefetch_factor x batch_size)

mod common;
mod config;
mod iterator;
mod loader;
mod pool;

pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use iterator::DataLoaderIter;
pub use loader::DataLoader;

pub use common::thread::{
    current_worker_id, init_worker_rng, reset_worker_rng, seeded_worker_rng, worker_gen_range,
    WORKER_ID, WORKER_RNG,
};
