use anyhow::{Context, Result};
use std::path::Path;
use tch::{Kind, Tensor};

/// Reads a `.npy` array file and converts it to `kind`.
///
/// Feature files are written by the extraction stage with whatever dtype numpy
/// chose (`float32` mels, `int64`/`int16` quantized audio), so every load is
/// normalized to the kind the collators expect.
///
/// # Errors
/// - Missing file, unsupported dtype or a malformed header. The error carries
///   the offending path.
pub fn read_npy(path: impl AsRef<Path>, kind: Kind) -> Result<Tensor> {
    let path = path.as_ref();
    let tensor = Tensor::read_npy(path)
        .with_context(|| format!("Failed to read array file: {}", path.display()))?;
    Ok(if tensor.kind() == kind {
        tensor
    } else {
        tensor.to_kind(kind)
    })
}
