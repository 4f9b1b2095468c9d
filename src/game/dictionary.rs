//! Dictionary used to score boards
//!
//! An embedded word list is compiled into the binary; a different list can be
//! loaded from any reader or file. Lookups are case-insensitive hash set hits.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Shortest string that can count as a word.
pub const MIN_WORD_LENGTH: usize = 2;

/// Embedded wordlist: lowercase, alphabetic only, one per line
static WORDS_DATA: &str = include_str!("../../data/words.txt");

/// Embedded dictionary, built on first use
static EMBEDDED: Lazy<Arc<Dictionary>> =
    Lazy::new(|| Arc::new(Dictionary::from_words(WORDS_DATA.lines())));

/// A dictionary word found inside a run of letters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundWord {
    /// Uppercase word text
    pub word: String,
    /// Index of the first letter within the searched run
    pub start: usize,
    /// One past the last letter
    pub end: usize,
}

impl FoundWord {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Read-only word set.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    /// Build from an iterator of words. Entries are trimmed and lowercased;
    /// blank or non-alphabetic entries are skipped.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .filter_map(|w| normalize_entry(w.as_ref()))
            .collect();
        Self { words }
    }

    /// Load one word per line from a reader.
    pub fn load<R: Read>(reader: R) -> io::Result<Self> {
        let mut words = HashSet::new();
        for line in BufReader::new(reader).lines() {
            if let Some(word) = normalize_entry(&line?) {
                words.insert(word);
            }
        }
        Ok(Self { words })
    }

    pub fn load_file(path: &Path) -> io::Result<Self> {
        Self::load(std::fs::File::open(path)?)
    }

    /// Shared handle to the embedded word list.
    pub fn embedded() -> Arc<Dictionary> {
        Arc::clone(&EMBEDDED)
    }

    /// Check if a word is in the dictionary.
    /// Case-insensitive; anything shorter than two letters is never a word.
    pub fn contains(&self, word: &str) -> bool {
        if word.chars().count() < MIN_WORD_LENGTH {
            return false;
        }
        self.words.contains(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Every dictionary word appearing as a contiguous slice of `letters`,
    /// ordered by start then length.
    pub fn find_words(&self, letters: &[char]) -> Vec<FoundWord> {
        let mut found = Vec::new();
        for start in 0..letters.len() {
            for end in (start + MIN_WORD_LENGTH)..=letters.len() {
                let candidate: String = letters[start..end].iter().collect();
                if self.contains(&candidate) {
                    found.push(FoundWord {
                        word: candidate.to_uppercase(),
                        start,
                        end,
                    });
                }
            }
        }
        found
    }
}

fn normalize_entry(raw: &str) -> Option<String> {
    let word = raw.trim();
    if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(word.to_lowercase())
}
