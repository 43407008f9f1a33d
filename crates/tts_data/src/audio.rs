//! Conversion between quantized waveform labels and float samples.

use tch::{Kind, Tensor};

/// Maps integer class labels in `[0, 2^bits - 1]` to floats in `[-1, 1]`.
pub fn label_to_float(labels: &Tensor, bits: u32) -> Tensor {
    let max_label = ((1u64 << bits) - 1) as f64;
    labels.to_kind(Kind::Float) * (2.0 / max_label) - 1.0
}

/// Inverse of [`label_to_float`]: maps `[-1, 1]` floats to integer labels.
pub fn float_to_label(samples: &Tensor, bits: u32) -> Tensor {
    let max_label = ((1u64 << bits) - 1) as f64;
    ((samples + 1.0) * (max_label / 2.0))
        .round()
        .clamp(0.0, max_label)
        .to_kind(Kind::Int64)
}
