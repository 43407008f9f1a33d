use crate::audio::label_to_float;
use crate::config::Hparams;
use crate::dataloader::worker_gen_range;
use crate::minibatch::{TtsBatch, UtteranceBatch, VocoderBatch};
use crate::sample::{TtsSample, VocoderSample};
use anyhow::{bail, ensure, Result};
use tch::{Device, Kind, Tensor};

/// A `Collator` turns a list of examples into one fixed-shape batch.
pub trait Collator {
    type Sample;
    type Batch;

    fn collate(&self, samples: &[Self::Sample]) -> Result<Self::Batch>;
}

/// Checks that every mel is 2-D with the same channel count, returns that count.
fn common_mel_channels<'a>(mels: impl Iterator<Item = &'a Tensor>) -> Result<i64> {
    let mut channels = None;
    for (i, mel) in mels.enumerate() {
        let shape = mel.size();
        ensure!(
            shape.len() == 2,
            "Sample #{} mel must be 2-D [num_mels, frames], got {:?}",
            i,
            shape
        );
        match channels {
            None => channels = Some(shape[0]),
            Some(c) if c != shape[0] => bail!(
                "Sample #{} has {} mel channels, expected {}",
                i,
                shape[0],
                c
            ),
            Some(_) => {}
        }
    }
    channels.ok_or_else(|| anyhow::anyhow!("Cannot collate empty sample list"))
}

//=======================================================================================================
/// Crops aligned, fixed-length windows out of `(mel, quantized waveform)` pairs.
///
/// With `mel_win = voc_seq_len / hop_length + 2 * voc_pad`, each example gets
/// an independent random `mel_offset` in `[0, mel_len - (mel_win + 2 * voc_pad))`.
/// The mel crop is `[:, mel_offset .. mel_offset + mel_win]`; the waveform crop
/// starts at `(mel_offset + voc_pad) * hop_length` and spans `voc_seq_len + 1`
/// samples, so the model sees `voc_pad` frames of mel context on each side of
/// the audio it predicts.
///
/// The waveform crop is then split into the decompanded input `x[:, :L]` and
/// the integer next-sample target `x[:, 1:]`.
///
/// Offsets come from the loader worker's thread-local RNG; nothing is shared
/// between batches or epochs.
#[derive(Debug, Clone)]
pub struct VocoderCollator {
    voc_seq_len: i64,
    hop_length: i64,
    voc_pad: i64,
    bits: u32,
}

impl VocoderCollator {
    pub fn new(voc_seq_len: usize, hop_length: usize, voc_pad: usize, bits: u32) -> Result<Self> {
        ensure!(hop_length > 0, "hop_length must be > 0");
        ensure!(
            voc_seq_len > 0 && voc_seq_len % hop_length == 0,
            "voc_seq_len ({}) must be a positive multiple of hop_length ({})",
            voc_seq_len,
            hop_length
        );
        ensure!((1..=16).contains(&bits), "bits must be in 1..=16, got {}", bits);
        Ok(Self {
            voc_seq_len: voc_seq_len as i64,
            hop_length: hop_length as i64,
            voc_pad: voc_pad as i64,
            bits,
        })
    }

    pub fn from_hparams(hparams: &Hparams) -> Result<Self> {
        Self::new(
            hparams.voc_seq_len,
            hparams.hop_length,
            hparams.voc_pad,
            hparams.bits,
        )
    }

    /// Width of every mel crop.
    pub fn mel_win(&self) -> i64 {
        self.voc_seq_len / self.hop_length + 2 * self.voc_pad
    }

    /// Exclusive upper bound of the mel offset for an utterance of `mel_len` frames.
    pub fn max_offset(&self, mel_len: i64) -> i64 {
        mel_len - (self.mel_win() + 2 * self.voc_pad)
    }

    /// Waveform sample at which the crop for `mel_offset` starts.
    pub fn sig_offset(&self, mel_offset: i64) -> i64 {
        (mel_offset + self.voc_pad) * self.hop_length
    }

    /// Crops every sample at the given mel offsets.
    ///
    /// Each offset must lie in `[0, max_offset)` for its sample and the waveform
    /// must cover `sig_offset + voc_seq_len + 1` samples.
    pub fn collate_at(&self, samples: &[VocoderSample], mel_offsets: &[i64]) -> Result<VocoderBatch> {
        ensure!(!samples.is_empty(), "Cannot collate empty sample list");
        ensure!(
            samples.len() == mel_offsets.len(),
            "Got {} offsets for {} samples",
            mel_offsets.len(),
            samples.len()
        );
        common_mel_channels(samples.iter().map(|s| &s.mel))?;

        let mel_win = self.mel_win();
        let crop_len = self.voc_seq_len + 1;
        let mut mels = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());

        for (i, (sample, &mel_offset)) in samples.iter().zip(mel_offsets).enumerate() {
            let max_offset = self.max_offset(sample.mel_len());
            ensure!(
                (0..max_offset).contains(&mel_offset),
                "Sample #{} mel offset {} outside [0, {})",
                i,
                mel_offset,
                max_offset
            );
            ensure!(
                sample.quant.dim() == 1,
                "Sample #{} waveform must be 1-D, got {:?}",
                i,
                sample.quant.size()
            );

            let sig_offset = self.sig_offset(mel_offset);
            ensure!(
                sig_offset + crop_len <= sample.quant_len(),
                "Sample #{} waveform has {} samples, crop needs {}..{}",
                i,
                sample.quant_len(),
                sig_offset,
                sig_offset + crop_len
            );

            mels.push(sample.mel.narrow(1, mel_offset, mel_win));
            labels.push(sample.quant.narrow(0, sig_offset, crop_len).to_kind(Kind::Int64));
        }

        let mel = Tensor::stack(&mels, 0).to_kind(Kind::Float);
        let labels = Tensor::stack(&labels, 0);
        let waveform_input = label_to_float(&labels.narrow(1, 0, self.voc_seq_len), self.bits);
        let waveform_target = labels.narrow(1, 1, self.voc_seq_len);

        Ok(VocoderBatch {
            waveform_input,
            waveform_target,
            mel,
            mel_offsets: mel_offsets.to_vec(),
        })
    }
}

impl Collator for VocoderCollator {
    type Sample = VocoderSample;
    type Batch = VocoderBatch;

    fn collate(&self, samples: &[VocoderSample]) -> Result<VocoderBatch> {
        let mut mel_offsets = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            let max_offset = self.max_offset(sample.mel_len());
            ensure!(
                max_offset > 0,
                "Sample #{} has {} mel frames; a vocoder crop needs more than {}",
                i,
                sample.mel_len(),
                self.mel_win() + 2 * self.voc_pad
            );
            mel_offsets.push(worker_gen_range(0..max_offset));
        }
        self.collate_at(samples, &mel_offsets)
    }
}

//=======================================================================================================
/// Pads variable-length `(tokens, mel)` pairs into one batch.
///
/// - Tokens are right-padded with 0 to the longest sequence in the batch.
/// - Mels are right-padded with 0 along time to `max_mel_len + 1`, rounded up to
///   a multiple of the reduction factor `r`. The extra frame leaves room for the
///   stop token.
/// - The whole padded mel array is then mapped from `[0, 1]` to `[-4, 4]` with
///   `mel * 8 - 4`, so padded frames end up at `-4`.
///
/// Input mels are expected to be normalized to `[0, 1]` upstream. This is
/// checked per batch unless disabled with [`with_range_check`](Self::with_range_check).
#[derive(Debug, Clone)]
pub struct TtsCollator {
    r: i64,
    check_range: bool,
}

impl TtsCollator {
    pub fn new(r: usize) -> Result<Self> {
        ensure!(r > 0, "Reduction factor must be > 0");
        Ok(Self {
            r: r as i64,
            check_range: true,
        })
    }

    pub fn from_hparams(hparams: &Hparams) -> Result<Self> {
        Self::new(hparams.tts_r)
    }

    pub fn with_range_check(mut self, check_range: bool) -> Self {
        self.check_range = check_range;
        self
    }

    /// Padded mel width for a batch whose longest mel has `max_mel_len` frames.
    pub fn padded_mel_len(&self, max_mel_len: i64) -> i64 {
        let mut len = max_mel_len + 1;
        if len % self.r != 0 {
            len += self.r - len % self.r;
        }
        len
    }

    fn check_normalized(&self, index: usize, mel: &Tensor) -> Result<()> {
        if mel.numel() == 0 {
            return Ok(());
        }
        let min = mel.min().double_value(&[]);
        let max = mel.max().double_value(&[]);
        ensure!(
            (0.0..=1.0).contains(&min) && (0.0..=1.0).contains(&max),
            "Sample #{} mel values span [{}, {}], expected normalized [0, 1]",
            index,
            min,
            max
        );
        Ok(())
    }
}

impl Collator for TtsCollator {
    type Sample = TtsSample;
    type Batch = TtsBatch;

    fn collate(&self, samples: &[TtsSample]) -> Result<TtsBatch> {
        ensure!(!samples.is_empty(), "Cannot collate empty sample list");
        let channels = common_mel_channels(samples.iter().map(|s| &s.mel))?;
        let batch_size = samples.len() as i64;

        let mut token_lengths = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            ensure!(
                sample.tokens.dim() == 1,
                "Sample #{} tokens must be 1-D, got {:?}",
                i,
                sample.tokens.size()
            );
            if self.check_range {
                self.check_normalized(i, &sample.mel)?;
            }
            token_lengths.push(sample.token_len());
        }
        let mel_lengths: Vec<i64> = samples.iter().map(TtsSample::mel_len).collect();

        let max_token_len = token_lengths.iter().copied().max().unwrap_or(0);
        let max_mel_len = self.padded_mel_len(mel_lengths.iter().copied().max().unwrap_or(0));

        let tokens = Tensor::zeros(&[batch_size, max_token_len], (Kind::Int64, Device::Cpu));
        let mel = Tensor::zeros(&[batch_size, channels, max_mel_len], (Kind::Float, Device::Cpu));

        for (i, sample) in samples.iter().enumerate() {
            let i = i as i64;
            tokens
                .select(0, i)
                .narrow(0, 0, token_lengths[i as usize])
                .copy_(&sample.tokens.to_kind(Kind::Int64));
            mel.select(0, i)
                .narrow(1, 0, mel_lengths[i as usize])
                .copy_(&sample.mel.to_kind(Kind::Float));
        }

        Ok(TtsBatch {
            tokens,
            mel: mel * 8.0 - 4.0,
            token_lengths,
            mel_lengths,
        })
    }
}

//=======================================================================================================
/// Stacks whole utterances without cropping or padding.
///
/// Used for vocoder evaluation, where the loader runs with batch size 1.
/// Any shape mismatch across the batch is an error.
#[derive(Debug, Clone, Default)]
pub struct UtteranceCollator;

impl Collator for UtteranceCollator {
    type Sample = VocoderSample;
    type Batch = UtteranceBatch;

    fn collate(&self, samples: &[VocoderSample]) -> Result<UtteranceBatch> {
        ensure!(!samples.is_empty(), "Cannot collate empty sample list");

        let mel_shape = samples[0].mel.size();
        let quant_shape = samples[0].quant.size();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            if sample.mel.size() != mel_shape || sample.quant.size() != quant_shape {
                bail!(
                    "Shape mismatch in sample {}: mel {:?} / quant {:?}, expected {:?} / {:?}",
                    i,
                    sample.mel.size(),
                    sample.quant.size(),
                    mel_shape,
                    quant_shape
                );
            }
        }

        let mels: Vec<&Tensor> = samples.iter().map(|s| &s.mel).collect();
        let quants: Vec<&Tensor> = samples.iter().map(|s| &s.quant).collect();
        Ok(UtteranceBatch {
            mel: Tensor::stack(&mels, 0),
            quant: Tensor::stack(&quants, 0),
        })
    }
}
