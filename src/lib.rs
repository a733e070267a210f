mod data;
pub mod config;
pub mod highlight;
pub mod practice;
#[cfg(feature = "web")]
pub mod web;

pub use data::{ExampleSentence, LessonDocument, LessonText, VocabularyEntry};
pub use highlight::{Highlighted, Highlighter, Segment};

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    #[error("failed to read lesson {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse lesson document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to compile pattern for vocabulary word {word:?}: {source}")]
    Pattern {
        word: String,
        #[source]
        source: regex::Error,
    },
}

/// Read-only lookup over a lesson's vocabulary.
pub struct VocabularyIndex {
    entries: Vec<VocabularyEntry>,
    by_id: HashMap<u32, usize>,
    by_word: HashMap<String, usize>,
}

impl VocabularyIndex {
    pub fn new(entries: Vec<VocabularyEntry>) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut by_word = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            match by_id.entry(entry.id) {
                Entry::Occupied(_) => {
                    warn!(id = entry.id, word = %entry.word, "duplicate vocabulary id ignored");
                }
                Entry::Vacant(slot) => {
                    slot.insert(position);
                }
            }
            by_word
                .entry(normalize_word(&entry.word))
                .or_insert(position);
        }
        Self {
            entries,
            by_id,
            by_word,
        }
    }

    /// Returns the entry for the given ID, if available.
    pub fn get(&self, id: u32) -> Option<&VocabularyEntry> {
        self.by_id.get(&id).map(|&position| &self.entries[position])
    }

    /// Resolves a textual ID such as the `data-id` of a highlight.
    pub fn get_str(&self, raw_id: &str) -> Option<&VocabularyEntry> {
        parse_id(raw_id).and_then(|id| self.get(id))
    }

    /// Case-insensitive exact word match.
    pub fn by_word(&self, word: &str) -> Option<&VocabularyEntry> {
        self.by_word
            .get(&normalize_word(word))
            .map(|&position| &self.entries[position])
    }

    /// Returns up to `limit` entries whose word contains `pattern`.
    pub fn search_contains(&self, pattern: &str, limit: usize) -> Vec<&VocabularyEntry> {
        let needle = normalize_word(pattern);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|entry| entry.word.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }

    /// All entries in document order.
    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn parse_id(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// A loaded lesson: its text plus the vocabulary index and highlighter built from it.
pub struct Lesson {
    title: Option<String>,
    text: LessonText,
    vocabulary: VocabularyIndex,
    highlighter: Highlighter,
}

impl Lesson {
    pub fn new(document: LessonDocument) -> Result<Self, LessonError> {
        let highlighter = Highlighter::new(&document.vocabulary)?;
        let LessonDocument {
            title,
            text,
            vocabulary,
        } = document;
        Ok(Self {
            title,
            text,
            vocabulary: VocabularyIndex::new(vocabulary),
            highlighter,
        })
    }

    pub fn from_json_str(input: &str) -> Result<Self, LessonError> {
        Self::new(LessonDocument::from_json_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, LessonError> {
        let lesson = Self::new(LessonDocument::load(path)?)?;
        info!(
            path = %path.display(),
            entries = lesson.vocabulary.len(),
            "Loaded lesson"
        );
        Ok(lesson)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text.en
    }

    pub fn translation(&self) -> Option<&str> {
        self.text.translation()
    }

    pub fn vocabulary(&self) -> &VocabularyIndex {
        &self.vocabulary
    }

    pub fn entry(&self, id: u32) -> Option<&VocabularyEntry> {
        self.vocabulary.get(id)
    }

    /// Highlights the source-language text against this lesson's vocabulary.
    pub fn highlighted(&self) -> Highlighted<'_> {
        self.highlighter.highlight(&self.text.en)
    }
}

#[cfg(test)]
pub(crate) fn sample_lesson() -> Lesson {
    Lesson::from_json_str(include_str!("../data/lesson.json")).expect("sample lesson parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, word: &str) -> VocabularyEntry {
        VocabularyEntry {
            id,
            word: word.to_string(),
            definition: String::new(),
            examples: Vec::new(),
        }
    }

    #[test]
    fn lookup_by_id_and_miss() {
        let index = VocabularyIndex::new(vec![entry(3, "cat"), entry(10, "dog")]);
        assert_eq!(index.get(10).map(|e| e.word.as_str()), Some("dog"));
        assert!(index.get(4).is_none());
        assert!(index.get(u32::MAX).is_none());
    }

    #[test]
    fn lookup_by_textual_id() {
        let index = VocabularyIndex::new(vec![entry(3, "cat")]);
        assert_eq!(index.get_str(" 3 ").map(|e| e.id), Some(3));
        assert!(index.get_str("abc").is_none());
        assert!(index.get_str("-1").is_none());
        assert!(index.get_str("").is_none());
    }

    #[test]
    fn duplicate_ids_keep_first_entry() {
        let index = VocabularyIndex::new(vec![entry(1, "first"), entry(1, "second")]);
        assert_eq!(index.get(1).map(|e| e.word.as_str()), Some("first"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn word_lookup_is_case_insensitive() {
        let index = VocabularyIndex::new(vec![entry(1, "Reaction")]);
        assert_eq!(index.by_word("  reaction ").map(|e| e.id), Some(1));
        assert!(index.by_word("react").is_none());
    }

    #[test]
    fn substring_search_respects_limit() {
        let index = VocabularyIndex::new(vec![
            entry(1, "act"),
            entry(2, "reaction"),
            entry(3, "actor"),
            entry(4, "dog"),
        ]);
        let ids: Vec<_> = index.search_contains("ACT", 10).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(index.search_contains("act", 2).len(), 2);
        assert!(index.search_contains("  ", 5).is_empty());
    }

    #[test]
    fn sample_lesson_highlights_vocabulary() {
        let lesson = sample_lesson();
        assert_eq!(lesson.title(), Some("A Quick Reaction"));
        let highlighted = lesson.highlighted();
        assert_eq!(highlighted.plain_text(), lesson.text());

        let ids: Vec<_> = highlighted.annotations().filter_map(|s| s.entry_id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3, 2, 5]);
        for segment in highlighted.annotations() {
            let entry = lesson.entry(segment.entry_id.unwrap()).unwrap();
            assert!(segment.text.eq_ignore_ascii_case(&entry.word));
        }
    }

    #[test]
    fn lesson_without_vocabulary_is_one_plain_segment() {
        let lesson = Lesson::from_json_str(r#"{"text":{"en":"Nothing to see."}}"#).unwrap();
        let highlighted = lesson.highlighted();
        assert_eq!(highlighted.segments().len(), 1);
        assert!(highlighted.annotations().next().is_none());
        assert!(lesson.translation().is_none());
        assert!(lesson.entry(1).is_none());
    }
}
