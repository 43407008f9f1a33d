//! src/corpus.rs
//!
//! The corpus index: the list of `(utterance id, mel length)` records written by
//! the feature-extraction stage, and the `id -> text` map used by TTS training.
//!
//! Layout under the corpus root:
//! ```text
//! <root>/dataset.json      [["LJ001-0001", 812], ["LJ001-0002", 143], ...]
//! <root>/text_dict.json    {"LJ001-0001": "Printing, in the only sense ...", ...}
//! <root>/mel/<id>.npy
//! <root>/quant/<id>.npy
//! ```
//!
//! Both files are loaded once per training run and never mutated afterwards.

use anyhow::{bail, ensure, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

pub const INDEX_FILE: &str = "dataset.json";
pub const TEXT_MAP_FILE: &str = "text_dict.json";

/// One entry of the corpus index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: String,
    /// Number of mel frames in the utterance
    pub length: usize,
}

/// Utterance ids partitioned for training.
///
/// `lengths[i]` is the mel length of `train_ids[i]`. `test_ids` is only
/// populated by the vocoder split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSplit {
    pub train_ids: Vec<String>,
    pub test_ids: Option<Vec<String>>,
    pub lengths: Vec<usize>,
}

/// The persisted list of `(id, length)` records.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    records: Vec<CorpusRecord>,
}

impl CorpusIndex {
    /// Builds an index from in-memory records. Ids must be unique.
    pub fn new(records: Vec<CorpusRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            ensure!(
                seen.insert(record.id.as_str()),
                "Duplicate utterance id '{}' in corpus index",
                record.id
            );
        }
        Ok(Self { records })
    }

    /// Reads `<root>/dataset.json`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(INDEX_FILE);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read corpus index: {}", path.display()))?;
        let pairs: Vec<(String, usize)> = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt corpus index: {}", path.display()))?;

        let records = pairs
            .into_iter()
            .map(|(id, length)| CorpusRecord { id, length })
            .collect();
        let index = Self::new(records)?;
        tracing::info!(path = %path.display(), records = index.len(), "loaded corpus index");
        Ok(index)
    }

    pub fn records(&self) -> &[CorpusRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Shuffles all ids with `seed` and holds out the last `held_out_count`.
    ///
    /// The same corpus and seed always produce the same partition.
    pub fn vocoder_split(&self, held_out_count: usize, seed: u64) -> Result<CorpusSplit> {
        ensure!(
            held_out_count <= self.records.len(),
            "Cannot hold out {} utterances from a corpus of {}",
            held_out_count,
            self.records.len()
        );

        let mut shuffled: Vec<&CorpusRecord> = self.records.iter().collect();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let split_at = shuffled.len() - held_out_count;
        let (train, test) = shuffled.split_at(split_at);

        tracing::info!(
            train = train.len(),
            test = test.len(),
            seed,
            "vocoder train/test split"
        );

        Ok(CorpusSplit {
            train_ids: train.iter().map(|r| r.id.clone()).collect(),
            test_ids: Some(test.iter().map(|r| r.id.clone()).collect()),
            lengths: train.iter().map(|r| r.length).collect(),
        })
    }

    /// Keeps records whose length is at most `max_len`, in index order.
    pub fn tts_filter(&self, max_len: usize) -> CorpusSplit {
        let (train_ids, lengths): (Vec<String>, Vec<usize>) = self
            .records
            .iter()
            .filter(|r| r.length <= max_len)
            .map(|r| (r.id.clone(), r.length))
            .unzip();

        tracing::info!(
            kept = train_ids.len(),
            dropped = self.records.len() - train_ids.len(),
            max_len,
            "filtered corpus for tts"
        );

        CorpusSplit {
            train_ids,
            test_ids: None,
            lengths,
        }
    }
}

/// Mapping from utterance id to its raw transcript.
#[derive(Debug, Clone, Default)]
pub struct TextMap {
    entries: HashMap<String, String>,
}

impl TextMap {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Reads `<root>/text_dict.json`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(TEXT_MAP_FILE);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read text map: {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt text map: {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = entries.len(), "loaded text map");
        Ok(Self { entries })
    }

    pub fn get(&self, id: &str) -> Result<&str> {
        match self.entries.get(id) {
            Some(text) => Ok(text.as_str()),
            None => bail!("No text entry for utterance '{}'", id),
        }
    }

    /// Fails on the first id without a transcript.
    pub fn check_covers<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for id in ids {
            self.get(id)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads the index and splits it for vocoder training.
pub fn load_vocoder_split(
    root: impl AsRef<Path>,
    held_out_count: usize,
    seed: u64,
) -> Result<CorpusSplit> {
    CorpusIndex::load(root)?.vocoder_split(held_out_count, seed)
}

/// Loads the index and text map for TTS training.
///
/// Every kept id must have a transcript.
pub fn load_tts_split(root: impl AsRef<Path>, max_input_len: usize) -> Result<(CorpusSplit, TextMap)> {
    let root = root.as_ref();
    let split = CorpusIndex::load(root)?.tts_filter(max_input_len);
    let text_map = TextMap::load(root)?;
    text_map
        .check_covers(&split.train_ids)
        .context("Text map does not cover the filtered corpus")?;
    Ok((split, text_map))
}
