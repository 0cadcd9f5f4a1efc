//! Controlled vocabulary entries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

/// One row of a controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    /// Phrase to look for (matched case-insensitively on word boundaries)
    pub phrase: String,
    /// Link target for the phrase
    pub target_href: String,
    /// Optional definition shown as a tooltip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl TermEntry {
    /// Create an entry. The phrase is trimmed and NFC-normalized.
    pub fn new(phrase: impl AsRef<str>, target_href: impl Into<String>) -> Self {
        Self {
            phrase: phrase.as_ref().trim().nfc().collect(),
            target_href: target_href.into(),
            tooltip: None,
        }
    }

    /// Create an entry linking to `#<slug>`.
    pub fn from_phrase(phrase: impl AsRef<str>) -> Self {
        let entry = Self::new(phrase, String::new());
        let href = format!("#{}", entry.slug());
        Self {
            target_href: href,
            ..entry
        }
    }

    /// Set the tooltip (builder form). Blank tooltips are ignored.
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        let tooltip = tooltip.into();
        if !tooltip.trim().is_empty() {
            self.tooltip = Some(tooltip.trim().to_string());
        }
        self
    }

    /// Slug of the phrase, used for intra-document anchors.
    pub fn slug(&self) -> String {
        slug(&self.phrase)
    }
}

/// Lowercase a phrase, replace runs of non-word characters with `_`, and trim `_`.
pub fn slug(phrase: &str) -> String {
    let lower = phrase.to_lowercase();
    NON_WORD
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

/// An ordered, case-insensitively deduplicated list of terms.
#[derive(Debug, Clone, Default)]
pub struct TermList {
    entries: Vec<TermEntry>,
}

impl TermList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from phrases, each linking to its slug.
    pub fn from_phrases<S: AsRef<str>>(phrases: &[S]) -> Self {
        let mut list = Self::new();
        for phrase in phrases {
            list.push(TermEntry::from_phrase(phrase));
        }
        list
    }

    /// Add an entry. Returns false if the phrase is empty or already present.
    pub fn push(&mut self, entry: TermEntry) -> bool {
        if entry.phrase.is_empty() || self.get(&entry.phrase).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Look up an entry by phrase, ignoring case.
    pub fn get(&self, phrase: &str) -> Option<&TermEntry> {
        let key: String = phrase.trim().nfc().collect::<String>().to_lowercase();
        self.entries.iter().find(|e| e.phrase.to_lowercase() == key)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[TermEntry] {
        &self.entries
    }

    /// Entries ordered by descending phrase length; equal lengths keep insertion order.
    pub fn by_length(&self) -> Vec<&TermEntry> {
        let mut sorted: Vec<&TermEntry> = self.entries.iter().collect();
        sorted.sort_by_key(|e| std::cmp::Reverse(e.phrase.chars().count()));
        sorted
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<TermEntry> for TermList {
    fn from_iter<I: IntoIterator<Item = TermEntry>>(iter: I) -> Self {
        let mut list = Self::new();
        for entry in iter {
            list.push(entry);
        }
        list
    }
}
