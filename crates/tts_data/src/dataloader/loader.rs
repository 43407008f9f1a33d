//! src/dataloader/loader.rs
//!
//! DataLoader constructors.
//!
//! # Constructor Overview
//!
//! ### Automatic Sampling
//! `new()` creates the sampler from `config.shuffle`:
//! - If `config.shuffle = false`, a SequentialSampler.
//! - If `config.shuffle = true`, a RandomSampler seeded with `config.seed`.
//!
//! ### Custom sampling
//! `with_sampler()` takes any index sampler (e.g. `BinnedLengthSampler`) and
//! wraps it in a `BatchSampler` using the configured `batch_size` and `drop_last`.
//!
//! # Seed Coordination
//!
//! The sampler's seed controls visiting order, while `config.seed` controls the
//! worker RNGs that draw crop offsets. Passing the same seed to both makes a
//! whole run reproducible:
//!
//! ```ignore
//! let seed = 42;
//! let sampler = BinnedLengthSampler::new(&lengths, 32, None, seed)?;
//! let config = DataLoaderConfig::builder().batch_size(32).seed(seed).build();
//! let loader = DataLoader::with_sampler(dataset, sampler, collator, config)?;
//! ```

use crate::collator::Collator;
use crate::dataset::Dataset;
use crate::sampler::{BatchSampler, RandomSampler, Sampler, SequentialSampler};
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use super::config::DataLoaderConfig;

/// Coordinates a `Dataset`, a batch order and a `Collator`.
///
/// # Thread safety:
/// - The dataset and collator are held behind `Arc` so fresh workers can share
///   them every epoch without copying.
/// - Multiple iterators can be created from the same DataLoader; each one
///   advances the epoch counter.
pub struct DataLoader<D, C> {
    pub(crate) dataset: Arc<D>,
    pub(crate) collator: Arc<C>,
    pub(crate) batch_sampler: Box<dyn Sampler<Item = Vec<usize>>>,
    pub(crate) config: DataLoaderConfig,
    pub(crate) current_epoch: AtomicUsize,
    pub(crate) runtime_seed: u64,
}

impl<D, C> DataLoader<D, C>
where
    D: Dataset + 'static,
    C: Collator<Sample = D::Sample> + Send + Sync + 'static,
    C::Batch: Send + 'static,
{
    /// Creates a DataLoader that samples sequentially, or randomly when
    /// `config.shuffle` is set.
    ///
    /// # Errors
    /// - `batch_size` is 0
    /// - `prefetch_factor` is 0 while using workers
    pub fn new(dataset: D, collator: C, config: DataLoaderConfig) -> Result<Self> {
        validate_config(&config)?;
        let runtime_seed = config.seed.unwrap_or_else(|| rand::rng().random());

        let batch_sampler: Box<dyn Sampler<Item = Vec<usize>>> = if config.shuffle {
            Box::new(
                BatchSampler::new(
                    RandomSampler::new(dataset.len(), runtime_seed),
                    config.batch_size,
                    config.drop_last,
                )
                .context("Failed to wrap sampler with BatchSampler")?,
            )
        } else {
            Box::new(
                BatchSampler::new(
                    SequentialSampler::new(dataset.len()),
                    config.batch_size,
                    config.drop_last,
                )
                .context("Failed to wrap sampler with BatchSampler")?,
            )
        };

        Ok(Self::assemble(dataset, collator, batch_sampler, config, runtime_seed))
    }

    /// Creates a DataLoader that visits indices in the order `sampler` yields.
    ///
    /// The sampler must yield every index of `dataset` exactly once per epoch.
    /// `config.shuffle` is ignored.
    pub fn with_sampler<S>(
        dataset: D,
        sampler: S,
        collator: C,
        config: DataLoaderConfig,
    ) -> Result<Self>
    where
        S: Sampler<Item = usize> + 'static,
    {
        validate_config(&config)?;
        let runtime_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let batch_sampler = BatchSampler::new(sampler, config.batch_size, config.drop_last)
            .context("Failed to wrap sampler with BatchSampler")?;

        Ok(Self::assemble(
            dataset,
            collator,
            Box::new(batch_sampler),
            config,
            runtime_seed,
        ))
    }

    /// Shorthand for a shuffled loader with the given batch size and workers.
    pub fn new_shuffled(
        dataset: D,
        collator: C,
        batch_size: usize,
        num_workers: usize,
        seed: u64,
    ) -> Result<Self> {
        let config = DataLoaderConfig::builder()
            .batch_size(batch_size)
            .num_workers(num_workers)
            .shuffle(true)
            .seed(seed)
            .build();
        Self::new(dataset, collator, config)
    }

    fn assemble(
        dataset: D,
        collator: C,
        batch_sampler: Box<dyn Sampler<Item = Vec<usize>>>,
        config: DataLoaderConfig,
        runtime_seed: u64,
    ) -> Self {
        tracing::debug!(
            examples = dataset.len(),
            batch_size = config.batch_size,
            num_workers = config.num_workers,
            shuffle = config.shuffle,
            seed = runtime_seed,
            "Created DataLoader"
        );
        Self {
            dataset: Arc::new(dataset),
            collator: Arc::new(collator),
            batch_sampler,
            config,
            current_epoch: AtomicUsize::new(0),
            runtime_seed,
        }
    }
}

impl<D: Dataset, C> DataLoader<D, C> {
    /// Number of batches one epoch yields.
    pub fn len(&self) -> usize {
        let examples = self.dataset.len();
        if self.config.drop_last {
            examples / self.config.batch_size
        } else {
            examples.div_ceil(self.config.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn collator(&self) -> &C {
        &self.collator
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// Seed used by the automatic sampler and the worker RNGs.
    pub fn seed(&self) -> u64 {
        self.runtime_seed
    }
}

fn validate_config(config: &DataLoaderConfig) -> Result<()> {
    if config.batch_size == 0 {
        return Err(anyhow!("Batch size must be greater than 0"));
    }
    if config.prefetch_factor == 0 && config.num_workers > 0 {
        return Err(anyhow!(
            "Prefetch factor must be > 0 when using {} workers",
            config.num_workers
        ));
    }
    Ok(())
}
