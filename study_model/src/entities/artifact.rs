//! Source artifacts: transcribed class notes and OCR'd mistakes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ParseError, SourceId, StudentId};

/// Kind of artifact a diagnosis is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A transcribed class note.
    Note,
    /// An OCR'd error-book entry.
    ErrorBook,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Note => "note",
            SourceType::ErrorBook => "error_book",
        }
    }
}

impl FromStr for SourceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "note" => Ok(SourceType::Note),
            "error_book" => Ok(SourceType::ErrorBook),
            other => Err(ParseError::UnknownSourceType(other.to_string())),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a source artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub source_type: SourceType,
    pub source_id: SourceId,
}

impl ArtifactRef {
    pub fn new(source_type: SourceType, source_id: i64) -> Self {
        Self {
            source_type,
            source_id: SourceId(source_id),
        }
    }

    pub fn note(source_id: i64) -> Self {
        Self::new(SourceType::Note, source_id)
    }

    pub fn error_book(source_id: i64) -> Self {
        Self::new(SourceType::ErrorBook, source_id)
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source_type, self.source_id)
    }
}

/// A source artifact as handed over by the transcription / OCR layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub reference: ArtifactRef,
    pub student: StudentId,

    /// Transcript or OCR text.
    pub text: String,

    /// Free-text subject as entered by the student or guessed upstream.
    pub subject_hint: Option<String>,

    /// Title of the note or mistake; used as the chapter the artifact hangs under.
    pub chapter_hint: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a new artifact with the given text.
    pub fn new(reference: ArtifactRef, student: StudentId, text: impl Into<String>) -> Self {
        Self {
            reference,
            student,
            text: text.into(),
            subject_hint: None,
            chapter_hint: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject_hint = Some(subject.into());
        self
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter_hint = Some(chapter.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Length of the text in characters; evidence spans are expressed in chars.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_round_trip() {
        assert_eq!("note".parse::<SourceType>().unwrap(), SourceType::Note);
        assert_eq!(" error_book ".parse::<SourceType>().unwrap(), SourceType::ErrorBook);
        assert!(matches!(
            "quiz".parse::<SourceType>(),
            Err(ParseError::UnknownSourceType(_))
        ));
    }

    #[test]
    fn test_source_type_serde_name() {
        let json = serde_json::to_string(&SourceType::ErrorBook).unwrap();
        assert_eq!(json, "\"error_book\"");
    }

    #[test]
    fn test_artifact_char_len_counts_chars() {
        let artifact = Artifact::new(ArtifactRef::note(1), StudentId(7), "二次函数");
        assert_eq!(artifact.char_len(), 4);
        assert_eq!(artifact.reference.to_string(), "note:1");
    }
}
