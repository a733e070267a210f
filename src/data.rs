use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::LessonError;

/// Lesson body in the source language, with an optional full translation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonText {
    pub en: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ja: Option<String>,
}

impl LessonText {
    /// The translation, if present and not blank.
    pub fn translation(&self) -> Option<&str> {
        self.ja.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }
}

/// A source-language sentence paired with its translation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExampleSentence {
    pub en: String,
    pub ja: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularyEntry {
    pub id: u32,
    pub word: String,
    pub definition: String,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
}

/// The lesson document as read from disk.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: LessonText,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,
}

impl LessonDocument {
    pub fn from_json_str(input: &str) -> Result<Self, LessonError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, LessonError> {
        let contents = fs::read_to_string(path).map_err(|source| LessonError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }
}
