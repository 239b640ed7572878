//! The shared word list every round draws from.
//!
//! Words are loaded once at startup and never change. The list is cyclic:
//! cursors wrap around at the end. The corpus also keeps the round anchor,
//! the position the next round's pre-fill starts from. Only a declared
//! winner moves it.

use std::fs;
use std::path::Path;

use log::debug;
use shared::{truncate_text, MAX_WORD_LEN};

use crate::error::CorpusError;

/// Position in the word list. Cursors are plain indices; they do not borrow
/// the corpus and stay valid because the list is never reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WordCursor(usize);

impl WordCursor {
    pub fn position(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct WordCorpus {
    words: Vec<String>,
    anchor: WordCursor,
}

impl WordCorpus {
    /// Reads and splits a word file. An unreadable or empty file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corpus = Self::from_words(Self::split(&String::from_utf8_lossy(&bytes)))?;
        debug!("Loaded {} words from {}", corpus.len(), path.display());
        Ok(corpus)
    }

    pub fn from_words<I, S>(words: I) -> Result<Self, CorpusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|word| truncate_text(word.as_ref(), MAX_WORD_LEN).to_string())
            .filter(|word| !word.is_empty())
            .collect();
        if words.is_empty() {
            return Err(CorpusError::Empty);
        }
        Ok(Self {
            words,
            anchor: WordCursor::default(),
        })
    }

    /// Splits text on whitespace, commas and periods.
    pub fn split(text: &str) -> Vec<&str> {
        text.split(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .filter(|word| !word.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn anchor(&self) -> WordCursor {
        self.anchor
    }

    pub fn set_anchor(&mut self, cursor: WordCursor) {
        self.anchor = cursor;
    }

    /// Word `ahead` positions past `cursor`, wrapping around the list.
    pub fn word_at(&self, cursor: WordCursor, ahead: usize) -> &str {
        &self.words[(cursor.0 + ahead) % self.words.len()]
    }

    pub fn advance(&self, cursor: WordCursor) -> WordCursor {
        WordCursor((cursor.0 + 1) % self.words.len())
    }
}
