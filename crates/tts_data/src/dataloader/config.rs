//! src/dataloader/config.rs
//!
//! Configuration for DataLoader behaviour
//!
//! Example:
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(2)
//!     .shuffle(true)
//!     .prefetch_factor(2)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: Each worker reads feature files and collates whole batches,
//!   so throughput scales with workers until the disk saturates.
//! - `prefetch_factor`: Batches each worker may run ahead of the consumer.

use std::time::Duration;

/// Configuration for DataLoader
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Number of samples per batch
    pub batch_size: usize,
    /// Number of parallel workers (0 = load on the calling thread)
    pub num_workers: usize,
    /// Whether to drop the last incomplete batch
    pub drop_last: bool,
    /// Visit the dataset in a fresh random order every epoch.
    /// Ignored when an explicit sampler is supplied.
    pub shuffle: bool,
    /// Seed for shuffling and for the per-worker crop RNG.
    /// `None` draws a fresh seed per loader.
    pub seed: Option<u64>,
    /// Number of batches each worker may have in flight (must be > 0 with workers)
    pub prefetch_factor: usize,
    /// Maximum time to wait for a batch from a worker before reporting it stuck
    pub timeout: Duration,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            drop_last: false,
            shuffle: false,
            seed: None,
            prefetch_factor: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }
}

/// Builder for DataLoaderConfig with method chaining
#[derive(Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the random seed for reproducible shuffling and crops.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set the timeout for receiving a batch from a worker.
    ///
    /// - Too low: May fail batches during legitimately slow disk reads
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}
