use crate::corpus::TextMap;
use crate::readers::read_npy;
use crate::sample::{TtsSample, VocoderSample};
use crate::text::TextEncoder;
use anyhow::{anyhow, ensure, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tch::{Kind, Tensor};

pub const MEL_DIR: &str = "mel";
pub const QUANT_DIR: &str = "quant";

/// Location of the mel spectrogram for `id` under a corpus root.
pub fn mel_path(root: &Path, id: &str) -> PathBuf {
    root.join(MEL_DIR).join(format!("{id}.npy"))
}

/// Location of the quantized waveform for `id` under a corpus root.
pub fn quant_path(root: &Path, id: &str) -> PathBuf {
    root.join(QUANT_DIR).join(format!("{id}.npy"))
}

/// A `Dataset` maps an index to one training example read from storage.
///
/// Records are loaded lazily on every `get`; nothing is cached across epochs.
/// Any failure (missing file, decode error, bad shape) is returned to the
/// caller, there is no skip-and-continue.
///
/// Implementations must be `Send + Sync` so loader workers can share one
/// instance behind an `Arc`.
pub trait Dataset: Send + Sync {
    type Sample: Send;

    /// Reads the example at `index`.
    fn get(&self, index: usize) -> Result<Self::Sample>;

    /// Returns the total number of examples.
    fn len(&self) -> usize;

    /// Returns the utterance id behind `index`.
    fn id(&self, index: usize) -> Option<&str>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_mel(root: &Path, id: &str, num_mels: Option<i64>) -> Result<Tensor> {
    let mel = read_npy(mel_path(root, id), Kind::Float)?;
    let shape = mel.size();
    ensure!(
        shape.len() == 2,
        "Mel for '{}' must be 2-D [num_mels, frames], got shape {:?}",
        id,
        shape
    );
    if let Some(expected) = num_mels {
        ensure!(
            shape[0] == expected,
            "Mel for '{}' has {} channels, expected {}",
            id,
            shape[0],
            expected
        );
    }
    Ok(mel)
}

/// Reads `(mel, quantized waveform)` pairs for vocoder training.
#[derive(Debug, Clone)]
pub struct VocoderDataset {
    root: PathBuf,
    ids: Arc<[String]>,
    num_mels: Option<i64>,
}

impl VocoderDataset {
    pub fn new(root: impl Into<PathBuf>, ids: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ids: ids.into(),
            num_mels: None,
        }
    }

    /// Rejects mels whose channel count differs from `num_mels`.
    pub fn with_num_mels(mut self, num_mels: usize) -> Self {
        self.num_mels = Some(num_mels as i64);
        self
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl Dataset for VocoderDataset {
    type Sample = VocoderSample;

    fn get(&self, index: usize) -> Result<VocoderSample> {
        let id = self
            .id(index)
            .ok_or_else(|| anyhow!("Index {} out of bounds for {} utterances", index, self.len()))?;

        let mel = read_mel(&self.root, id, self.num_mels)?;
        let quant = read_npy(quant_path(&self.root, id), Kind::Int64)?;
        ensure!(
            quant.dim() == 1,
            "Quantized waveform for '{}' must be 1-D, got shape {:?}",
            id,
            quant.size()
        );
        Ok(VocoderSample::new(mel, quant))
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn id(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }
}

/// Reads `(token sequence, mel)` pairs for TTS training.
///
/// Tokens are derived on every read by running the encoder over the text map
/// entry for the utterance.
#[derive(Clone)]
pub struct TtsDataset {
    root: PathBuf,
    ids: Arc<[String]>,
    text_map: Arc<TextMap>,
    encoder: Arc<dyn TextEncoder>,
    num_mels: Option<i64>,
}

impl TtsDataset {
    pub fn new(
        root: impl Into<PathBuf>,
        ids: Vec<String>,
        text_map: Arc<TextMap>,
        encoder: Arc<dyn TextEncoder>,
    ) -> Self {
        Self {
            root: root.into(),
            ids: ids.into(),
            text_map,
            encoder,
            num_mels: None,
        }
    }

    /// Rejects mels whose channel count differs from `num_mels`.
    pub fn with_num_mels(mut self, num_mels: usize) -> Self {
        self.num_mels = Some(num_mels as i64);
        self
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl Dataset for TtsDataset {
    type Sample = TtsSample;

    fn get(&self, index: usize) -> Result<TtsSample> {
        let id = self
            .id(index)
            .ok_or_else(|| anyhow!("Index {} out of bounds for {} utterances", index, self.len()))?;

        let text = self.text_map.get(id)?;
        let tokens = self
            .encoder
            .encode(text)
            .with_context(|| format!("Failed to encode text for '{}'", id))?;
        let mel = read_mel(&self.root, id, self.num_mels)?;
        Ok(TtsSample::new(Tensor::from_slice(&tokens), mel))
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn id(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }
}
