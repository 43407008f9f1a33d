#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::Path;
use tch::{Device, Kind, Tensor};
use tempfile::TempDir;
use tts_data::corpus::{INDEX_FILE, TEXT_MAP_FILE};
use tts_data::dataset::{mel_path, quant_path, MEL_DIR, QUANT_DIR};
use tts_data::Hparams;

pub const NUM_MELS: i64 = 4;
pub const HOP_LENGTH: usize = 4;

/// Hyperparameters sized for tiny test utterances:
/// `mel_win = 8 / 4 + 2 * 1 = 4`, so an utterance needs more than 6 frames.
pub fn small_hparams() -> Result<Hparams> {
    Hparams::builder()
        .num_mels(NUM_MELS as usize)
        .hop_length(HOP_LENGTH)
        .voc_seq_len(8)
        .voc_pad(1)
        .voc_test_samples(2)
        .bits(9)
        .tts_max_input_len(40)
        .tts_bin_size(4)
        .build()
}

pub fn utterance_id(i: usize) -> String {
    format!("utt_{:03}", i)
}

/// Value every mel bin of utterance `i` is filled with, so batches can be
/// traced back to the utterance they came from.
pub fn marker(i: usize) -> f64 {
    (i + 1) as f64 / 128.0
}

/// Recovers the utterance index from a mel value written with [`marker`].
pub fn utterance_from_marker(value: f64) -> usize {
    (value * 128.0).round() as usize - 1
}

/// Writes a corpus with one utterance per entry of `lengths` (mel frames).
///
/// Utterance `i` gets a constant mel of [`marker`]`(i)`, a quantized waveform
/// `0, 1, 2, ...` of `len * HOP_LENGTH + 1` samples, and the text
/// `"Utterance number i."`.
pub fn write_corpus(lengths: &[usize]) -> Result<TempDir> {
    let dir = TempDir::new()?;
    write_corpus_into(dir.path(), lengths)?;
    Ok(dir)
}

pub fn write_corpus_into(root: &Path, lengths: &[usize]) -> Result<()> {
    fs::create_dir_all(root.join(MEL_DIR))?;
    fs::create_dir_all(root.join(QUANT_DIR))?;

    let mut index = Vec::with_capacity(lengths.len());
    let mut texts = serde_json::Map::new();
    for (i, &len) in lengths.iter().enumerate() {
        let id = utterance_id(i);
        let mel = Tensor::full(&[NUM_MELS, len as i64], marker(i), (Kind::Float, Device::Cpu));
        mel.write_npy(mel_path(root, &id))?;
        let samples = (len * HOP_LENGTH + 1) as i64;
        let quant = Tensor::arange(samples, (Kind::Int64, Device::Cpu)).remainder(512);
        quant.write_npy(quant_path(root, &id))?;

        index.push(serde_json::json!([id, len]));
        texts.insert(id, serde_json::Value::String(format!("Utterance number {}.", i)));
    }
    fs::write(root.join(INDEX_FILE), serde_json::to_string(&index)?)?;
    fs::write(root.join(TEXT_MAP_FILE), serde_json::to_string(&texts)?)?;
    Ok(())
}

/// Utterance index of every row in a `[B, num_mels, T]` mel batch.
///
/// Reads column 0, which is never padding.
pub fn batch_utterances(mel: &Tensor) -> Vec<usize> {
    (0..mel.size()[0])
        .map(|i| utterance_from_marker(mel.double_value(&[i, 0, 0])))
        .collect()
}

/// Same as [`batch_utterances`] for TTS batches, whose mels are rescaled to `[-4, 4]`.
pub fn tts_batch_utterances(mel: &Tensor) -> Vec<usize> {
    (0..mel.size()[0])
        .map(|i| utterance_from_marker((mel.double_value(&[i, 0, 0]) + 4.0) / 8.0))
        .collect()
}

/// Parses the index back out of an id written by [`utterance_id`].
pub fn index_of(id: &str) -> usize {
    id.trim_start_matches("utt_").parse().unwrap_or(usize::MAX)
}
