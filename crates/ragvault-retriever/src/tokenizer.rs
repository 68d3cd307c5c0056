//! Keyword tokenizer.
//!
//! Splits on Unicode word boundaries (UAX #29), lowercases, and passes every
//! token through a [`TokenFilter`]. There is no stemming.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

/// Decides which lowercased tokens survive tokenization.
pub trait TokenFilter: Send + Sync + fmt::Debug {
    fn keep(&self, token: &str) -> bool;
}

/// Keeps every token.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl TokenFilter for KeepAll {
    fn keep(&self, _token: &str) -> bool {
        true
    }
}

/// Drops the listed tokens (stopwords).
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    words: HashSet<String>,
}

impl DenyList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }
}

impl TokenFilter for DenyList {
    fn keep(&self, token: &str) -> bool {
        !self.words.contains(token)
    }
}

/// Keeps only the listed tokens.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    words: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }
}

impl TokenFilter for AllowList {
    fn keep(&self, token: &str) -> bool {
        self.words.contains(token)
    }
}

/// Lowercasing Unicode word tokenizer with a pluggable filter.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    filter: Arc<dyn TokenFilter>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            filter: Arc::new(KeepAll),
        }
    }

    pub fn with_filter(filter: impl TokenFilter + 'static) -> Self {
        Self {
            filter: Arc::new(filter),
        }
    }

    /// Build from configured stopword and allow lists. A word present in
    /// both lists is dropped.
    pub fn from_lists(stopwords: &[String], allowlist: &[String]) -> Self {
        if !allowlist.is_empty() {
            let deny = DenyList::new(stopwords);
            let allowed = allowlist
                .iter()
                .map(|w| w.to_lowercase())
                .filter(|w| deny.keep(w));
            return Self::with_filter(AllowList::new(allowed));
        }
        if !stopwords.is_empty() {
            return Self::with_filter(DenyList::new(stopwords));
        }
        Self::new()
    }

    /// Tokenize text into the terms used for indexing and scoring.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|w| w.to_lowercase())
            .filter(|w| self.filter.keep(w))
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}
