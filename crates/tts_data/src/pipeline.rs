//! src/pipeline.rs
//!
//! Ready-made loaders for the two training stages.
//!
//! - `vocoder_loaders`: shuffled random-crop batches for training, plus whole
//!   held-out utterances (one per batch) for evaluation.
//! - `tts_loader`: padded text/mel batches, length-binned when
//!   `tts_bin_lengths` is set.
//!
//! The `_with_seed` variants fix every source of randomness (shuffle order,
//! bin shuffles and crop offsets); the plain variants draw a fresh seed.

use crate::collator::{TtsCollator, UtteranceCollator, VocoderCollator};
use crate::config::Hparams;
use crate::corpus::{load_tts_split, load_vocoder_split};
use crate::dataloader::{DataLoader, DataLoaderConfig};
use crate::dataset::{Dataset, TtsDataset, VocoderDataset};
use crate::sampler::{BinnedLengthSampler, SequentialSampler};
use crate::text::{SymbolEncoder, TextEncoder};
use anyhow::{Context, Result};
use rand::Rng;
use std::path::Path;
use std::sync::Arc;

pub type VocoderTrainLoader = DataLoader<VocoderDataset, VocoderCollator>;
pub type VocoderTestLoader = DataLoader<VocoderDataset, UtteranceCollator>;
pub type TtsLoader = DataLoader<TtsDataset, TtsCollator>;

const VOCODER_TRAIN_WORKERS: usize = 2;
const VOCODER_TEST_WORKERS: usize = 1;
const TTS_WORKERS: usize = 1;

/// Builds the vocoder training and evaluation loaders for the corpus at `root`.
///
/// The last `voc_test_samples` ids of a shuffle seeded with `voc_split_seed`
/// are held out, so the split is identical across runs.
pub fn vocoder_loaders(
    root: impl AsRef<Path>,
    hparams: &Hparams,
    batch_size: usize,
) -> Result<(VocoderTrainLoader, VocoderTestLoader)> {
    vocoder_loaders_with_seed(root, hparams, batch_size, rand::rng().random())
}

pub fn vocoder_loaders_with_seed(
    root: impl AsRef<Path>,
    hparams: &Hparams,
    batch_size: usize,
    seed: u64,
) -> Result<(VocoderTrainLoader, VocoderTestLoader)> {
    hparams.validate()?;
    let root = root.as_ref();

    let split = load_vocoder_split(root, hparams.voc_test_samples, hparams.voc_split_seed)
        .with_context(|| format!("Failed to split vocoder corpus at {:?}", root))?;
    let test_ids = split.test_ids.unwrap_or_default();

    tracing::info!(
        train = split.train_ids.len(),
        test = test_ids.len(),
        batch_size,
        "Building vocoder loaders"
    );

    let train_dataset = VocoderDataset::new(root, split.train_ids).with_num_mels(hparams.num_mels);
    let train = DataLoader::new(
        train_dataset,
        VocoderCollator::from_hparams(hparams)?,
        DataLoaderConfig::builder()
            .batch_size(batch_size)
            .num_workers(VOCODER_TRAIN_WORKERS)
            .shuffle(true)
            .seed(seed)
            .build(),
    )?;

    let test_dataset = VocoderDataset::new(root, test_ids).with_num_mels(hparams.num_mels);
    let test = DataLoader::new(
        test_dataset,
        UtteranceCollator,
        DataLoaderConfig::builder()
            .batch_size(1)
            .num_workers(VOCODER_TEST_WORKERS)
            .seed(seed)
            .build(),
    )?;

    Ok((train, test))
}

/// Builds the TTS training loader for the corpus at `root`.
///
/// Utterances longer than `tts_max_input_len` mel frames are dropped.
pub fn tts_loader(root: impl AsRef<Path>, hparams: &Hparams, batch_size: usize) -> Result<TtsLoader> {
    tts_loader_with_seed(root, hparams, batch_size, rand::rng().random())
}

pub fn tts_loader_with_seed(
    root: impl AsRef<Path>,
    hparams: &Hparams,
    batch_size: usize,
    seed: u64,
) -> Result<TtsLoader> {
    hparams.validate()?;
    let root = root.as_ref();

    let (split, text_map) = load_tts_split(root, hparams.tts_max_input_len)
        .with_context(|| format!("Failed to load TTS corpus at {:?}", root))?;
    let encoder: Arc<dyn TextEncoder> = Arc::new(SymbolEncoder::new(&hparams.tts_cleaner_names)?);

    tracing::info!(
        examples = split.train_ids.len(),
        batch_size,
        binned = hparams.tts_bin_lengths,
        "Building TTS loader"
    );

    let dataset = TtsDataset::new(root, split.train_ids, Arc::new(text_map), encoder)
        .with_num_mels(hparams.num_mels);
    let collator = TtsCollator::from_hparams(hparams)?;
    let config = DataLoaderConfig::builder()
        .batch_size(batch_size)
        .num_workers(TTS_WORKERS)
        .seed(seed)
        .build();

    if hparams.tts_bin_lengths {
        let sampler = BinnedLengthSampler::new(
            &split.lengths,
            batch_size,
            Some(hparams.tts_bin_size),
            seed,
        )?;
        DataLoader::with_sampler(dataset, sampler, collator, config)
    } else {
        let sampler = SequentialSampler::new(dataset.len());
        DataLoader::with_sampler(dataset, sampler, collator, config)
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::corpus::{INDEX_FILE, TEXT_MAP_FILE};
    use crate::dataset::{mel_path, quant_path, MEL_DIR, QUANT_DIR};
    use std::fs;
    use tch::{Device, Kind, Tensor};
    use tempfile::TempDir;

    const NUM_MELS: i64 = 4;

    fn small_hparams() -> Result<Hparams> {
        Hparams::builder()
            .num_mels(NUM_MELS as usize)
            .hop_length(4)
            .voc_seq_len(8)
            .voc_pad(1)
            .voc_test_samples(2)
            .tts_max_input_len(12)
            .tts_bin_size(4)
            .build()
    }

    fn write_corpus(lengths: &[usize]) -> Result<TempDir> {
        let dir = TempDir::new()?;
        let root = dir.path();
        fs::create_dir_all(root.join(MEL_DIR))?;
        fs::create_dir_all(root.join(QUANT_DIR))?;

        let mut index = Vec::new();
        let mut texts = serde_json::Map::new();
        for (i, &len) in lengths.iter().enumerate() {
            let id = format!("utt_{:02}", i);
            let mel = Tensor::rand(&[NUM_MELS, len as i64], (Kind::Float, Device::Cpu));
            mel.write_npy(mel_path(root, &id))?;
            let quant = Tensor::arange(len as i64 * 4 + 1, (Kind::Int64, Device::Cpu)).remainder(512);
            quant.write_npy(quant_path(root, &id))?;
            index.push(serde_json::json!([id, len]));
            texts.insert(id, serde_json::Value::String(format!("sample number {}.", i)));
        }
        fs::write(root.join(INDEX_FILE), serde_json::to_string(&index)?)?;
        fs::write(root.join(TEXT_MAP_FILE), serde_json::to_string(&texts)?)?;
        Ok(dir)
    }

    #[test]
    fn vocoder_loaders_hold_out_test_ids() -> Result<()> {
        let corpus = write_corpus(&[10, 11, 12, 13, 14, 15])?;
        let (train, test) = vocoder_loaders_with_seed(corpus.path(), &small_hparams()?, 2, 7)?;

        assert_eq!(train.dataset().len(), 4);
        assert_eq!(test.dataset().len(), 2);
        assert_eq!(train.len(), 2);
        assert_eq!(test.len(), 2);
        assert_eq!(train.config().num_workers, 2);
        for id in test.dataset().ids() {
            assert!(!train.dataset().ids().contains(id));
        }
        Ok(())
    }

    #[test]
    fn tts_loader_filters_long_utterances() -> Result<()> {
        let corpus = write_corpus(&[5, 20, 7, 12, 13, 3])?;
        let loader = tts_loader_with_seed(corpus.path(), &small_hparams()?, 2, 3)?;

        assert_eq!(loader.dataset().len(), 4);
        assert_eq!(loader.config().num_workers, 1);
        Ok(())
    }

    #[test]
    fn tts_loader_rejects_misaligned_bin_size() -> Result<()> {
        let corpus = write_corpus(&[5, 6, 7])?;
        assert!(tts_loader_with_seed(corpus.path(), &small_hparams()?, 3, 0).is_err());
        Ok(())
    }

    #[test]
    fn invalid_hparams_fail_before_reading() {
        let hparams = Hparams {
            hop_length: 0,
            ..Hparams::default()
        };
        assert!(vocoder_loaders("/nonexistent", &hparams, 4).is_err());
        assert!(tts_loader("/nonexistent", &hparams, 4).is_err());
    }
}
