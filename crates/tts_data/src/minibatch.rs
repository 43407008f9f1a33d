use tch::{Device, Tensor};

/// A batch of aligned vocoder crops, produced by [`VocoderCollator`].
///
/// With `B` = batch size and `L` = `voc_seq_len`:
/// - `waveform_input`: `[B, L]` float, the decompanded signal `x[t]`
/// - `waveform_target`: `[B, L]` int64, the next-sample labels `x[t + 1]`
/// - `mel`: `[B, num_mels, mel_win]` float conditioning window
/// - `mel_offsets`: first mel frame of each crop, in batch order
///
/// [`VocoderCollator`]: crate::collator::VocoderCollator
#[derive(Debug)]
pub struct VocoderBatch {
    pub waveform_input: Tensor,
    pub waveform_target: Tensor,
    pub mel: Tensor,
    pub mel_offsets: Vec<i64>,
}

impl VocoderBatch {
    pub fn batch_size(&self) -> i64 {
        self.mel.size()[0]
    }

    /// Transfers all tensors to the target device (CPU/GPU)
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            waveform_input: self.waveform_input.to_device(device),
            waveform_target: self.waveform_target.to_device(device),
            mel: self.mel.to_device(device),
            mel_offsets: self.mel_offsets.clone(),
        }
    }
}

/// A padded batch of TTS examples, produced by [`TtsCollator`].
///
/// - `tokens`: `[B, max_T_t]` int64, right-padded with 0
/// - `mel`: `[B, num_mels, max_T_m]` float in `[-4, 4]`; `max_T_m` is a multiple
///   of the reduction factor and strictly greater than every input length,
///   padded frames hold `-4`
/// - `token_lengths` / `mel_lengths`: unpadded lengths per example, in batch order
///
/// [`TtsCollator`]: crate::collator::TtsCollator
#[derive(Debug)]
pub struct TtsBatch {
    pub tokens: Tensor,
    pub mel: Tensor,
    pub token_lengths: Vec<i64>,
    pub mel_lengths: Vec<i64>,
}

impl TtsBatch {
    pub fn batch_size(&self) -> i64 {
        self.tokens.size()[0]
    }

    pub fn to_device(&self, device: Device) -> Self {
        Self {
            tokens: self.tokens.to_device(device),
            mel: self.mel.to_device(device),
            token_lengths: self.token_lengths.clone(),
            mel_lengths: self.mel_lengths.clone(),
        }
    }
}

/// Whole, uncropped utterances stacked along dim 0, used for vocoder evaluation.
#[derive(Debug)]
pub struct UtteranceBatch {
    pub mel: Tensor,
    pub quant: Tensor,
}

impl UtteranceBatch {
    pub fn batch_size(&self) -> i64 {
        self.mel.size()[0]
    }

    pub fn to_device(&self, device: Device) -> Self {
        Self {
            mel: self.mel.to_device(device),
            quant: self.quant.to_device(device),
        }
    }
}
