use tch::Tensor;

/// One vocoder training example as read from disk.
///
/// - `mel`: `[num_mels, T_m]` float spectrogram
/// - `quant`: `[T_w]` int64 quantized waveform, with `T_w ≈ T_m * hop_length`
///
/// The alignment between the two signals is established upstream; the collator
/// only checks that both are long enough for the crop it draws.
#[derive(Debug)]
pub struct VocoderSample {
    pub mel: Tensor,
    pub quant: Tensor,
}

impl Clone for VocoderSample {
    fn clone(&self) -> Self {
        Self {
            mel: self.mel.shallow_clone(),
            quant: self.quant.shallow_clone(),
        }
    }
}

impl VocoderSample {
    pub fn new(mel: Tensor, quant: Tensor) -> Self {
        Self { mel, quant }
    }

    /// Number of mel frames.
    pub fn mel_len(&self) -> i64 {
        self.mel.size().last().copied().unwrap_or(0)
    }

    /// Number of waveform samples.
    pub fn quant_len(&self) -> i64 {
        self.quant.size().first().copied().unwrap_or(0)
    }
}

/// One TTS training example.
///
/// - `tokens`: `[T_t]` int64 symbol ids
/// - `mel`: `[num_mels, T_m]` float spectrogram normalized to `[0, 1]`
#[derive(Debug)]
pub struct TtsSample {
    pub tokens: Tensor,
    pub mel: Tensor,
}

impl Clone for TtsSample {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.shallow_clone(),
            mel: self.mel.shallow_clone(),
        }
    }
}

impl TtsSample {
    pub fn new(tokens: Tensor, mel: Tensor) -> Self {
        Self { tokens, mel }
    }

    pub fn token_len(&self) -> i64 {
        self.tokens.size().first().copied().unwrap_or(0)
    }

    pub fn mel_len(&self) -> i64 {
        self.mel.size().last().copied().unwrap_or(0)
    }
}
