pub mod audio;
pub mod collator;
pub mod config;
pub mod corpus;
pub mod dataloader;
pub mod dataset;
pub mod minibatch;
pub mod pipeline;
pub mod readers;
pub mod sample;
pub mod sampler;
pub mod text;

pub use collator::{Collator, TtsCollator, UtteranceCollator, VocoderCollator};
pub use config::Hparams;
pub use dataloader::{DataLoader, DataLoaderConfig};
pub use dataset::{Dataset, TtsDataset, VocoderDataset};
pub use minibatch::{TtsBatch, UtteranceBatch, VocoderBatch};
pub use pipeline::{tts_loader, vocoder_loaders};
pub use sample::{TtsSample, VocoderSample};
pub use sampler::{BinnedLengthSampler, Sampler};
