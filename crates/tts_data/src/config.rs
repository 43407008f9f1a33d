//! src/config.rs
//!
//! Training hyperparameters shared by the vocoder and TTS batch pipelines.
//!
//! `Hparams` is read once per training run and treated as read-only afterwards.
//! It can be built in code or loaded from a JSON file; keys missing from the
//! file fall back to the defaults below.
//!
//! Example:
//! ```ignore
//! let hparams = Hparams::builder()
//!     .hop_length(200)
//!     .voc_seq_len(2000)
//!     .voc_pad(2)
//!     .tts_r(5)
//!     .build()?;
//! ```

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default seed for the train/test split of the vocoder corpus.
pub const VOCODER_SPLIT_SEED: u64 = 1234;

/// Hyperparameters consumed by the batch pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hparams {
    /// Number of mel channels every feature file is expected to carry
    pub num_mels: usize,
    /// Waveform samples per mel frame
    pub hop_length: usize,
    /// Length of the waveform crop fed to the vocoder (multiple of `hop_length`)
    pub voc_seq_len: usize,
    /// Context padding, in mel frames, on each side of the vocoder crop
    pub voc_pad: usize,
    /// Number of utterances held out for vocoder evaluation
    pub voc_test_samples: usize,
    /// Seed for the vocoder train/test shuffle
    pub voc_split_seed: u64,
    /// Bit depth of the quantized waveform
    pub bits: u32,
    /// Utterances whose mel length exceeds this are dropped from TTS training
    pub tts_max_input_len: usize,
    /// Decoder reduction factor
    pub tts_r: usize,
    /// Group utterances of similar length into batches
    pub tts_bin_lengths: bool,
    /// Bin size of the length-binned sampler (multiple of the batch size)
    pub tts_bin_size: usize,
    /// Text normalization steps applied before encoding
    pub tts_cleaner_names: Vec<String>,
}

impl Default for Hparams {
    fn default() -> Self {
        Self {
            num_mels: 80,
            hop_length: 275,
            voc_seq_len: 275 * 5,
            voc_pad: 2,
            voc_test_samples: 50,
            voc_split_seed: VOCODER_SPLIT_SEED,
            bits: 9,
            tts_max_input_len: 700,
            tts_r: 1,
            tts_bin_lengths: true,
            tts_bin_size: 512,
            tts_cleaner_names: vec!["english_cleaners".to_string()],
        }
    }
}

impl Hparams {
    pub fn builder() -> HparamsBuilder {
        HparamsBuilder::default()
    }

    /// Loads hyperparameters from a JSON file and validates them.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hparams file: {}", path.display()))?;
        let hparams: Hparams = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid hparams JSON in {}", path.display()))?;
        hparams.validate()?;
        Ok(hparams)
    }

    /// Checks the cross-field invariants the collators rely on.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_mels > 0, "num_mels must be > 0");
        ensure!(self.hop_length > 0, "hop_length must be > 0");
        ensure!(
            self.voc_seq_len > 0 && self.voc_seq_len % self.hop_length == 0,
            "voc_seq_len ({}) must be a positive multiple of hop_length ({})",
            self.voc_seq_len,
            self.hop_length
        );
        ensure!(
            (1..=16).contains(&self.bits),
            "bits must be in 1..=16, but got bits={}",
            self.bits
        );
        ensure!(self.tts_r > 0, "tts_r must be > 0");
        ensure!(self.tts_bin_size > 0, "tts_bin_size must be > 0");
        Ok(())
    }

    /// Width of the mel window that accompanies one vocoder crop.
    pub fn mel_win(&self) -> usize {
        self.voc_seq_len / self.hop_length + 2 * self.voc_pad
    }
}

/// Builder for `Hparams` with method chaining
#[derive(Default)]
pub struct HparamsBuilder {
    hparams: Hparams,
}

impl HparamsBuilder {
    pub fn num_mels(mut self, num_mels: usize) -> Self {
        self.hparams.num_mels = num_mels;
        self
    }

    pub fn hop_length(mut self, hop_length: usize) -> Self {
        self.hparams.hop_length = hop_length;
        self
    }

    pub fn voc_seq_len(mut self, voc_seq_len: usize) -> Self {
        self.hparams.voc_seq_len = voc_seq_len;
        self
    }

    pub fn voc_pad(mut self, voc_pad: usize) -> Self {
        self.hparams.voc_pad = voc_pad;
        self
    }

    pub fn voc_test_samples(mut self, count: usize) -> Self {
        self.hparams.voc_test_samples = count;
        self
    }

    pub fn voc_split_seed(mut self, seed: u64) -> Self {
        self.hparams.voc_split_seed = seed;
        self
    }

    pub fn bits(mut self, bits: u32) -> Self {
        self.hparams.bits = bits;
        self
    }

    pub fn tts_max_input_len(mut self, max_len: usize) -> Self {
        self.hparams.tts_max_input_len = max_len;
        self
    }

    pub fn tts_r(mut self, r: usize) -> Self {
        self.hparams.tts_r = r;
        self
    }

    pub fn tts_bin_lengths(mut self, enabled: bool) -> Self {
        self.hparams.tts_bin_lengths = enabled;
        self
    }

    pub fn tts_bin_size(mut self, bin_size: usize) -> Self {
        self.hparams.tts_bin_size = bin_size;
        self
    }

    pub fn tts_cleaner_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hparams.tts_cleaner_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and returns the final hyperparameters.
    pub fn build(self) -> Result<Hparams> {
        self.hparams.validate()?;
        Ok(self.hparams)
    }
}
