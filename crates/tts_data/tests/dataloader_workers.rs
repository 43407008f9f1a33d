//! DataLoader tests with an in-memory dataset.
//!
//! Tests cover:
//! - Batch order is preserved with several workers
//! - Worker count does not change what a seeded epoch produces
//! - Inline iterators on one thread keep independent random streams
//! - Collators can read which worker builds a batch
//! - drop_last and len()
//! - Errors and timeouts abort the epoch

use anyhow::{bail, Result};
use std::thread;
use std::time::Duration;
use tts_data::collator::Collator;
use tts_data::dataloader::{current_worker_id, worker_gen_range, DataLoader, DataLoaderConfig};
use tts_data::sampler::SequentialSampler;
use tts_data::Dataset;

/// Yields its own index, optionally failing or stalling on one of them.
struct IndexDataset {
    len: usize,
    fail_at: Option<usize>,
    delay: Option<(usize, Duration)>,
}

impl IndexDataset {
    fn new(len: usize) -> Self {
        Self {
            len,
            fail_at: None,
            delay: None,
        }
    }
}

impl Dataset for IndexDataset {
    type Sample = usize;

    fn get(&self, index: usize) -> Result<usize> {
        if self.fail_at == Some(index) {
            bail!("corrupt record {}", index);
        }
        if let Some((slow_index, delay)) = self.delay {
            if slow_index == index {
                thread::sleep(delay);
            }
        }
        Ok(index)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn id(&self, _index: usize) -> Option<&str> {
        None
    }
}

/// Keeps the indices and draws one random value per batch from the worker RNG.
struct TagCollator;

impl Collator for TagCollator {
    type Sample = usize;
    type Batch = (Vec<usize>, i64);

    fn collate(&self, samples: &[usize]) -> Result<(Vec<usize>, i64)> {
        Ok((samples.to_vec(), worker_gen_range(0..1_000_000)))
    }
}

/// Reports the id of the worker that collated the batch.
struct WorkerIdCollator;

impl Collator for WorkerIdCollator {
    type Sample = usize;
    type Batch = usize;

    fn collate(&self, _samples: &[usize]) -> Result<usize> {
        Ok(current_worker_id())
    }
}

fn config(batch_size: usize, num_workers: usize) -> DataLoaderConfig {
    DataLoaderConfig::builder()
        .batch_size(batch_size)
        .num_workers(num_workers)
        .prefetch_factor(1)
        .seed(7)
        .build()
}

#[test]
fn test_workers_preserve_sampler_order() -> Result<()> {
    let loader = DataLoader::new(IndexDataset::new(23), TagCollator, config(2, 3))?;
    assert_eq!(loader.len(), 12);

    let indices: Vec<usize> = loader
        .iter()?
        .map(|batch| batch.map(|(indices, _)| indices))
        .collect::<Result<Vec<_>>>()?
        .concat();
    assert_eq!(indices, (0..23).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_shuffled_epochs_cover_dataset() -> Result<()> {
    let loader = DataLoader::new_shuffled(IndexDataset::new(30), TagCollator, 4, 2, 3)?;

    let mut orders = Vec::new();
    for _ in 0..2 {
        let mut order: Vec<usize> = loader
            .iter()?
            .map(|batch| batch.map(|(indices, _)| indices))
            .collect::<Result<Vec<_>>>()?
            .concat();
        orders.push(order.clone());
        order.sort_unstable();
        assert_eq!(order, (0..30).collect::<Vec<_>>());
    }
    assert_ne!(orders[0], orders[1]);
    Ok(())
}

#[test]
fn test_inline_and_single_worker_draw_the_same_values() -> Result<()> {
    // Batch k always runs on worker k % n, and worker 0 seeds exactly like
    // the inline path, so 0 and 1 workers produce identical epochs.
    let draws = |num_workers: usize| -> Result<Vec<Vec<i64>>> {
        let loader = DataLoader::new(IndexDataset::new(10), TagCollator, config(3, num_workers))?;
        (0..2)
            .map(|_| {
                loader
                    .iter()?
                    .map(|batch| batch.map(|(_, tag)| tag))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    };

    let inline = draws(0)?;
    assert_eq!(inline, draws(1)?);
    assert_ne!(inline[0], inline[1]);

    let multi = draws(3)?;
    assert_eq!(multi, draws(3)?);
    Ok(())
}

#[test]
fn test_inline_iterators_on_one_thread_keep_their_own_draws() -> Result<()> {
    let tag = |batch: Result<(Vec<usize>, i64)>| batch.map(|(_, tag)| tag);
    let loader = || DataLoader::new(IndexDataset::new(12), TagCollator, config(2, 0));

    let solo: Vec<i64> = loader()?.iter()?.map(tag).collect::<Result<_>>()?;
    assert_eq!(solo.len(), 6);

    // Interleaved: each iterator still sees its own stream.
    let (first_loader, second_loader) = (loader()?, loader()?);
    let mut first = first_loader.iter()?;
    let mut second = second_loader.iter()?;
    let mut first_tags = Vec::new();
    let mut second_tags = Vec::new();
    for _ in 0..solo.len() {
        first_tags.push(first.next().map(tag).transpose()?);
        second_tags.push(second.next().map(tag).transpose()?);
    }
    assert_eq!(first_tags.into_iter().flatten().collect::<Vec<_>>(), solo);
    assert_eq!(second_tags.into_iter().flatten().collect::<Vec<_>>(), solo);

    // Dropping one iterator part way leaves the other untouched.
    let (kept_loader, dropped_loader) = (loader()?, loader()?);
    let mut kept = kept_loader.iter()?;
    let head = kept.next().map(tag).transpose()?;
    let mut dropped = dropped_loader.iter()?;
    dropped.next().map(tag).transpose()?;
    drop(dropped);
    let rest: Vec<i64> = kept.map(tag).collect::<Result<_>>()?;
    assert_eq!(head.into_iter().chain(rest).collect::<Vec<_>>(), solo);
    Ok(())
}

#[test]
fn test_collators_see_the_building_worker() -> Result<()> {
    let workers = |num_workers: usize| -> Result<Vec<usize>> {
        let loader = DataLoader::new(IndexDataset::new(14), WorkerIdCollator, config(2, num_workers))?;
        let batches = loader.iter()?.collect();
        batches
    };

    assert_eq!(workers(3)?, (0..7).map(|k| k % 3).collect::<Vec<_>>());
    assert_eq!(workers(0)?, vec![0; 7]);
    Ok(())
}

#[test]
fn test_drop_last() -> Result<()> {
    let cfg = DataLoaderConfig::builder().batch_size(4).drop_last(true).build();
    let loader = DataLoader::with_sampler(
        IndexDataset::new(10),
        SequentialSampler::new(10),
        TagCollator,
        cfg,
    )?;
    assert_eq!(loader.len(), 2);

    let sizes: Vec<usize> = loader
        .iter()?
        .map(|batch| batch.map(|(indices, _)| indices.len()))
        .collect::<Result<_>>()?;
    assert_eq!(sizes, vec![4, 4]);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let zero_batch = DataLoaderConfig::builder().batch_size(0).build();
    assert!(DataLoader::new(IndexDataset::new(4), TagCollator, zero_batch).is_err());

    let zero_prefetch = DataLoaderConfig::builder()
        .num_workers(2)
        .prefetch_factor(0)
        .build();
    assert!(DataLoader::new(IndexDataset::new(4), TagCollator, zero_prefetch).is_err());
}

#[test]
fn test_error_ends_epoch_in_every_mode() -> Result<()> {
    for num_workers in [0, 1, 3] {
        let dataset = IndexDataset {
            fail_at: Some(5),
            ..IndexDataset::new(12)
        };
        let loader = DataLoader::new(dataset, TagCollator, config(2, num_workers))?;

        let results: Vec<_> = loader.iter()?.collect();
        assert_eq!(results.len(), 3, "workers={}", num_workers);
        assert!(results[..2].iter().all(|r| r.is_ok()));
        let err = results[2].as_ref().err().map(|e| format!("{:#}", e)).unwrap_or_default();
        assert!(err.contains("corrupt record 5"), "unexpected error: {}", err);

        // The next epoch starts over.
        assert!(loader.iter()?.next().is_some_and(|batch| batch.is_ok()));
    }
    Ok(())
}

#[test]
fn test_stuck_worker_times_out() -> Result<()> {
    let dataset = IndexDataset {
        delay: Some((0, Duration::from_millis(500))),
        ..IndexDataset::new(4)
    };
    let cfg = DataLoaderConfig::builder()
        .batch_size(2)
        .num_workers(1)
        .timeout(Duration::from_millis(50))
        .build();
    let loader = DataLoader::new(dataset, TagCollator, cfg)?;

    let mut iter = loader.iter()?;
    let first = iter.next();
    assert!(first.is_some_and(|batch| batch.is_err()));
    assert!(iter.next().is_none());
    Ok(())
}
