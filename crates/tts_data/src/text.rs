//! src/text.rs
//!
//! Text normalization and symbol encoding for TTS inputs.
//!
//! The dataset only depends on the [`TextEncoder`] trait; [`SymbolEncoder`] is the
//! character-level encoder used by default. Cleaners are selected by name from
//! `Hparams::tts_cleaner_names` and applied in order before encoding.

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Id 0, used to right-pad token sequences in a batch.
pub const PAD: char = '_';
/// Appended to every encoded sequence.
pub const EOS: char = '~';

pub const PAD_ID: i64 = 0;
pub const EOS_ID: i64 = 1;

const SPECIAL: &str = "-";
const PUNCTUATION: &str = "!'(),.:;? ";
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("mrs", "misess"),
    ("mr", "mister"),
    ("dr", "doctor"),
    ("st", "saint"),
    ("co", "company"),
    ("jr", "junior"),
    ("maj", "major"),
    ("gen", "general"),
    ("drs", "doctors"),
    ("rev", "reverend"),
    ("lt", "lieutenant"),
    ("hon", "honorable"),
    ("sgt", "sergeant"),
    ("capt", "captain"),
    ("esq", "esquire"),
    ("ltd", "limited"),
    ("col", "colonel"),
    ("ft", "fort"),
];

/// Converts a transcript into a sequence of integer token ids.
///
/// Implementations are shared read-only across loader workers.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<i64>>;
}

/// A named text normalization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleaner {
    /// Lowercase and collapse whitespace.
    Basic,
    /// Drop non-ASCII characters, lowercase, collapse whitespace.
    Transliteration,
    /// Lowercase, expand common abbreviations, collapse whitespace.
    English,
}

impl Cleaner {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "basic_cleaners" => Ok(Cleaner::Basic),
            "transliteration_cleaners" => Ok(Cleaner::Transliteration),
            "english_cleaners" => Ok(Cleaner::English),
            other => bail!(
                "Unknown text cleaner '{}'. Expected one of: basic_cleaners, \
                 transliteration_cleaners, english_cleaners",
                other
            ),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            Cleaner::Basic => collapse_whitespace(&text.to_lowercase()),
            Cleaner::Transliteration => {
                let ascii: String = text.chars().filter(char::is_ascii).collect();
                collapse_whitespace(&ascii.to_lowercase())
            }
            Cleaner::English => {
                let ascii: String = text.chars().filter(char::is_ascii).collect();
                let expanded = expand_abbreviations(&ascii.to_lowercase());
                collapse_whitespace(&expanded)
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replaces `mr.`-style words with their spoken form. Expects lowercase input.
fn expand_abbreviations(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            ABBREVIATIONS
                .iter()
                .find_map(|(abbr, full)| {
                    word.strip_prefix(abbr)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .map(|rest| format!("{full}{rest}"))
                })
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Character-level encoder over a fixed symbol table.
///
/// Symbol ids: `_` = 0 (padding), `~` = 1 (end of sequence), then `-`,
/// punctuation and ASCII letters. Characters outside the table are skipped.
#[derive(Debug, Clone)]
pub struct SymbolEncoder {
    cleaners: Vec<Cleaner>,
    symbol_to_id: HashMap<char, i64>,
}

impl SymbolEncoder {
    pub fn new<S: AsRef<str>>(cleaner_names: &[S]) -> Result<Self> {
        let cleaners = cleaner_names
            .iter()
            .map(|name| Cleaner::from_name(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let symbol_to_id = [PAD, EOS]
            .into_iter()
            .chain(SPECIAL.chars())
            .chain(PUNCTUATION.chars())
            .chain(LETTERS.chars())
            .enumerate()
            .map(|(id, symbol)| (symbol, id as i64))
            .collect();

        Ok(Self {
            cleaners,
            symbol_to_id,
        })
    }

    pub fn num_symbols(&self) -> usize {
        self.symbol_to_id.len()
    }

    pub fn clean(&self, text: &str) -> String {
        self.cleaners
            .iter()
            .fold(text.to_string(), |text, cleaner| cleaner.apply(&text))
    }
}

impl TextEncoder for SymbolEncoder {
    fn encode(&self, text: &str) -> Result<Vec<i64>> {
        let cleaned = self.clean(text);
        let mut sequence: Vec<i64> = cleaned
            .chars()
            .filter(|&c| c != PAD && c != EOS)
            .filter_map(|c| self.symbol_to_id.get(&c).copied())
            .collect();
        sequence.push(EOS_ID);
        Ok(sequence)
    }
}
