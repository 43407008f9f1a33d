use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// A `Sampler` decides the order in which dataset indices are visited.
///
/// # Method
/// - `iter(epoch)`: returns the order for that epoch. Randomized samplers seed
///   their RNG with `base_seed + epoch`, so a fixed base seed reproduces every
///   epoch while consecutive epochs still differ.
///
/// Implementations must be `Send + Sync` so a loader can hand the same sampler
/// to every epoch without cloning it.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

#[inline]
fn epoch_rng(base_seed: u64, epoch: usize) -> StdRng {
    StdRng::seed_from_u64(base_seed.wrapping_add(epoch as u64))
}

/// ============================================================================
/// Yields `0, 1, ..., dataset_size - 1` in order, every epoch.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(0..self.dataset_size)
    }
}

/// ============================================================================
/// A fresh uniform permutation of `0..dataset_size` every epoch.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Self {
        Self {
            dataset_size,
            base_seed,
        }
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut indices: Vec<usize> = (0..self.dataset_size).collect();
        indices.shuffle(&mut epoch_rng(self.base_seed, epoch));
        Box::new(indices.into_iter())
    }
}

/// ============================================================================
/// Groups the items of an inner sampler into consecutive mini-batches.
///
/// Batch boundaries are contiguous `batch_size` slices of the inner order, so
/// a length-binned inner order turns directly into length-homogeneous batches.
/// With `drop_last`, a trailing batch shorter than `batch_size` is discarded.
#[derive(Debug, Clone)]
pub struct BatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
}

impl<S: Sampler> BatchSampler<S> {
    pub fn new(sampler: S, batch_size: usize, drop_last: bool) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<S: Sampler> Sampler for BatchSampler<S> {
    type Item = Vec<S::Item>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        let mut inner = self.sampler.iter(epoch);
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;

        Box::new(std::iter::from_fn(move || {
            let mini_batch: Vec<S::Item> = inner.by_ref().take(batch_size).collect();
            if mini_batch.len() == batch_size || (!drop_last && !mini_batch.is_empty()) {
                Some(mini_batch)
            } else {
                None
            }
        }))
    }
}

/// ============================================================================
/// Orders indices so that similarly long examples land in the same batches,
/// while keeping randomness both within and across length clusters.
///
/// # Arguments:
/// - `lengths`: Length of every example (e.g. mel frames), indexed like the dataset.
/// - `batch_size`: Size of the mini-batches the caller will cut from the order.
/// - `bin_size`: Examples per length cluster. Must be a multiple of `batch_size`
///               so no batch straddles two clusters. Defaults to `4 * batch_size`.
/// - `base_seed`: Base RNG seed, combined with the epoch.
///
/// # Algorithm
/// 1. Stable-sort all indices by ascending length (done once, at construction).
/// 2. Cut the sorted order into full bins of `bin_size`.
/// 3. Shuffle the order of the bins.
/// 4. Copy each bin, in that order, into one preallocated output permutation,
///    shuffling the bin's slice in place.
/// 5. The `N % bin_size` longest leftover indices form a final partial bin,
///    shuffled on its own and placed after every full bin.
///
/// ```text
/// lengths sorted:  [a b c d | e f g h | i j]      bin_size = 4
/// bins shuffled:   [e f g h] [a b c d]  + rest [i j]
/// output:          [g e h f  b d a c  j i]
/// ```
///
/// The output has length `N` (examples, not batches).
#[derive(Debug, Clone)]
pub struct BinnedLengthSampler {
    sorted_indices: Vec<usize>,
    bin_size: usize,
    base_seed: u64,
}

impl BinnedLengthSampler {
    pub fn new(
        lengths: &[usize],
        batch_size: usize,
        bin_size: Option<usize>,
        base_seed: u64,
    ) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        let bin_size = bin_size.unwrap_or(batch_size * 4);
        ensure!(
            bin_size > 0 && bin_size % batch_size == 0,
            "bin_size ({}) must be a positive multiple of batch_size ({})",
            bin_size,
            batch_size
        );

        let mut sorted_indices: Vec<usize> = (0..lengths.len()).collect();
        sorted_indices.sort_by_key(|&i| lengths[i]);

        tracing::debug!(
            examples = lengths.len(),
            bin_size,
            full_bins = lengths.len() / bin_size,
            remainder = lengths.len() % bin_size,
            "built length-binned sampler"
        );

        Ok(Self {
            sorted_indices,
            bin_size,
            base_seed,
        })
    }

    pub fn bin_size(&self) -> usize {
        self.bin_size
    }

    pub fn len(&self) -> usize {
        self.sorted_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_indices.is_empty()
    }

    /// Builds the permutation for `epoch`.
    pub fn permutation(&self, epoch: usize) -> Vec<usize> {
        let mut rng = epoch_rng(self.base_seed, epoch);
        let n = self.sorted_indices.len();
        let num_full_bins = n / self.bin_size;
        let full_len = num_full_bins * self.bin_size;

        let mut bin_order: Vec<usize> = (0..num_full_bins).collect();
        bin_order.shuffle(&mut rng);

        let mut output = vec![0usize; n];
        for (slot, &bin) in output[..full_len]
            .chunks_exact_mut(self.bin_size)
            .zip(&bin_order)
        {
            let start = bin * self.bin_size;
            slot.copy_from_slice(&self.sorted_indices[start..start + self.bin_size]);
            slot.shuffle(&mut rng);
        }

        let remainder = &mut output[full_len..];
        remainder.copy_from_slice(&self.sorted_indices[full_len..]);
        remainder.shuffle(&mut rng);

        output
    }
}

impl Sampler for BinnedLengthSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(self.permutation(epoch).into_iter())
    }
}
