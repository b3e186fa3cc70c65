//! Reference catalog domain model
//!
//! `RefEntry` is the aggregate root. It owns its senses, pronunciations and
//! images; senses own their translations and examples. Child collections are
//! always present, possibly empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Canonical dictionary headword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefEntry {
    pub id: Uuid,
    pub text: String,
    /// Natural dedup key, unique across the catalog
    pub text_normalized: String,
    pub frequency_rank: Option<i32>,
    pub cefr_level: Option<String>,
    pub is_core_lexicon: bool,
    pub created_at: DateTime<Utc>,

    pub senses: Vec<RefSense>,
    pub pronunciations: Vec<RefPronunciation>,
    pub images: Vec<RefImage>,
}

impl RefEntry {
    /// New root with empty child collections
    pub fn new(id: Uuid, text: impl Into<String>, text_normalized: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            text_normalized: text_normalized.into(),
            frequency_rank: None,
            cefr_level: None,
            is_core_lexicon: false,
            created_at: Utc::now(),
            senses: Vec::new(),
            pronunciations: Vec::new(),
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefSense {
    pub id: Uuid,
    pub ref_entry_id: Uuid,
    pub definition: Option<String>,
    pub part_of_speech: Option<PartOfSpeech>,
    pub cefr_level: Option<String>,
    pub notes: Option<String>,
    pub source_slug: String,
    /// Stable display order within the entry
    pub position: i32,
    pub created_at: DateTime<Utc>,

    pub translations: Vec<RefTranslation>,
    pub examples: Vec<RefExample>,
}

impl RefSense {
    pub fn new(id: Uuid, ref_entry_id: Uuid, source_slug: impl Into<String>, position: i32) -> Self {
        Self {
            id,
            ref_entry_id,
            definition: None,
            part_of_speech: None,
            cefr_level: None,
            notes: None,
            source_slug: source_slug.into(),
            position,
            created_at: Utc::now(),
            translations: Vec::new(),
            examples: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTranslation {
    pub id: Uuid,
    pub ref_sense_id: Uuid,
    pub text: String,
    pub source_slug: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefExample {
    pub id: Uuid,
    pub ref_sense_id: Uuid,
    pub sentence: String,
    pub translation: Option<String>,
    pub source_slug: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPronunciation {
    pub id: Uuid,
    pub ref_entry_id: Uuid,
    pub transcription: Option<String>,
    pub audio_url: Option<String>,
    pub region: Option<String>,
    pub source_slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefImage {
    pub id: Uuid,
    pub ref_entry_id: Uuid,
    pub url: String,
    pub caption: Option<String>,
    pub source_slug: String,
}

/// Directional edge between two entries (synonym, antonym, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefWordRelation {
    pub id: Uuid,
    pub source_entry_id: Uuid,
    pub target_entry_id: Uuid,
    pub relation_type: String,
    pub source_slug: String,
    pub created_at: DateTime<Utc>,
}

/// Per-(entry, source) record of whether that source's data is attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefEntrySourceCoverage {
    pub ref_entry_id: Uuid,
    pub source_slug: String,
    pub status: CoverageStatus,
    pub dataset_version: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Registry record of a known external source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefDataSource {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub source_type: String,
    pub is_active: bool,
    pub dataset_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial metadata update applied by normalized text.
///
/// `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadataUpdate {
    pub text_normalized: String,
    pub frequency_rank: Option<i32>,
    pub cefr_level: Option<String>,
    pub is_core_lexicon: Option<bool>,
}

/// Lookup key for loading a full aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKey {
    Id(Uuid),
    Text(String),
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Id(id) => write!(f, "{}", id),
            EntryKey::Text(text) => write!(f, "{:?}", text),
        }
    }
}

/// Grammatical category of a sense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Pronoun,
    Preposition,
    Conjunction,
    Interjection,
    Phrase,
    Idiom,
    Other,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 11] = [
        PartOfSpeech::Noun,
        PartOfSpeech::Verb,
        PartOfSpeech::Adjective,
        PartOfSpeech::Adverb,
        PartOfSpeech::Pronoun,
        PartOfSpeech::Preposition,
        PartOfSpeech::Conjunction,
        PartOfSpeech::Interjection,
        PartOfSpeech::Phrase,
        PartOfSpeech::Idiom,
        PartOfSpeech::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "NOUN",
            PartOfSpeech::Verb => "VERB",
            PartOfSpeech::Adjective => "ADJECTIVE",
            PartOfSpeech::Adverb => "ADVERB",
            PartOfSpeech::Pronoun => "PRONOUN",
            PartOfSpeech::Preposition => "PREPOSITION",
            PartOfSpeech::Conjunction => "CONJUNCTION",
            PartOfSpeech::Interjection => "INTERJECTION",
            PartOfSpeech::Phrase => "PHRASE",
            PartOfSpeech::Idiom => "IDIOM",
            PartOfSpeech::Other => "OTHER",
        }
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartOfSpeech {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartOfSpeech::ALL
            .into_iter()
            .find(|pos| pos.as_str() == s)
            .ok_or_else(|| Error::validation("part_of_speech", s, "unknown part of speech"))
    }
}

/// Attachment state of one source for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    Pending,
    Fetched,
    Failed,
}

impl CoverageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Pending => "pending",
            CoverageStatus::Fetched => "fetched",
            CoverageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CoverageStatus::Pending),
            "fetched" => Ok(CoverageStatus::Fetched),
            "failed" => Ok(CoverageStatus::Failed),
            other => Err(Error::validation(
                "coverage_status",
                other,
                "unknown coverage status",
            )),
        }
    }
}

/// CEFR levels accepted by the schema's check constraints
pub const CEFR_LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_of_speech_round_trips_through_text() {
        for pos in PartOfSpeech::ALL {
            assert_eq!(pos.as_str().parse::<PartOfSpeech>().unwrap(), pos);
        }
        assert!("noun".parse::<PartOfSpeech>().is_err());
    }

    #[test]
    fn test_part_of_speech_serde_matches_storage_text() {
        let json = serde_json::to_string(&PartOfSpeech::Interjection).unwrap();
        assert_eq!(json, "\"INTERJECTION\"");
    }

    #[test]
    fn test_coverage_status_parse() {
        assert_eq!("fetched".parse::<CoverageStatus>().unwrap(), CoverageStatus::Fetched);
        let err = "done".parse::<CoverageStatus>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn test_new_entry_has_empty_children() {
        let entry = RefEntry::new(Uuid::new_v4(), "Café", "cafe");
        assert!(entry.senses.is_empty());
        assert!(entry.pronunciations.is_empty());
        assert!(entry.images.is_empty());
        assert!(!entry.is_core_lexicon);
    }
}
