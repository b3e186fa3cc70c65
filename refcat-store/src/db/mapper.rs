//! Aggregate Mapper
//!
//! Row structs mirror the stored columns one-to-one; `into_*` converts them
//! to domain values. Stored ids and timestamps that fail to parse surface as
//! internal errors naming the entity and column.

use refcat_common::db::models::{
    CoverageStatus, PartOfSpeech, RefDataSource, RefEntry, RefEntrySourceCoverage, RefExample,
    RefImage, RefPronunciation, RefSense, RefTranslation, RefWordRelation,
};
use refcat_common::{time, uuid_utils, Error, Result};
use sqlx::FromRow;

pub const ENTRY_COLUMNS: &str =
    "id, text, text_normalized, frequency_rank, cefr_level, is_core_lexicon, created_at";
pub const SENSE_COLUMNS: &str =
    "id, ref_entry_id, definition, part_of_speech, cefr_level, notes, source_slug, position, created_at";
pub const TRANSLATION_COLUMNS: &str = "id, ref_sense_id, text, source_slug, position";
pub const EXAMPLE_COLUMNS: &str = "id, ref_sense_id, sentence, translation, source_slug, position";
pub const PRONUNCIATION_COLUMNS: &str =
    "id, ref_entry_id, transcription, audio_url, region, source_slug";
pub const IMAGE_COLUMNS: &str = "id, ref_entry_id, url, caption, source_slug";
pub const RELATION_COLUMNS: &str =
    "id, source_entry_id, target_entry_id, relation_type, source_slug, created_at";
pub const COVERAGE_COLUMNS: &str =
    "ref_entry_id, source_slug, status, dataset_version, fetched_at";
pub const DATA_SOURCE_COLUMNS: &str =
    "slug, name, description, source_type, is_active, dataset_version, created_at, updated_at";

#[derive(Debug, FromRow)]
pub struct EntryRow {
    pub id: String,
    pub text: String,
    pub text_normalized: String,
    pub frequency_rank: Option<i32>,
    pub cefr_level: Option<String>,
    pub is_core_lexicon: Option<bool>,
    pub created_at: String,
}

impl EntryRow {
    /// Root entry with empty child collections
    pub fn into_entry(self) -> Result<RefEntry> {
        let id = uuid_utils::parse_stored("ref_entry", "id", &self.id)?;
        Ok(RefEntry {
            created_at: time::parse_stored("ref_entry", "created_at", &self.created_at)?,
            frequency_rank: self.frequency_rank,
            cefr_level: self.cefr_level,
            is_core_lexicon: self.is_core_lexicon.unwrap_or(false),
            ..RefEntry::new(id, self.text, self.text_normalized)
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SenseRow {
    pub id: String,
    pub ref_entry_id: String,
    pub definition: Option<String>,
    pub part_of_speech: Option<String>,
    pub cefr_level: Option<String>,
    pub notes: Option<String>,
    pub source_slug: String,
    pub position: i32,
    pub created_at: String,
}

impl SenseRow {
    pub fn into_sense(self) -> Result<RefSense> {
        let id = uuid_utils::parse_stored("ref_sense", "id", &self.id)?;
        let part_of_speech = self
            .part_of_speech
            .as_deref()
            .map(|pos| {
                pos.parse::<PartOfSpeech>().map_err(|_| {
                    Error::Internal(format!("ref_sense {} holds unknown part_of_speech {:?}", id, pos))
                })
            })
            .transpose()?;

        Ok(RefSense {
            ref_entry_id: uuid_utils::parse_stored("ref_sense", "ref_entry_id", &self.ref_entry_id)?,
            definition: self.definition,
            part_of_speech,
            cefr_level: self.cefr_level,
            notes: self.notes,
            created_at: time::parse_stored("ref_sense", "created_at", &self.created_at)?,
            ..RefSense::new(id, id, self.source_slug, self.position)
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TranslationRow {
    pub id: String,
    pub ref_sense_id: String,
    pub text: String,
    pub source_slug: String,
    pub position: i32,
}

impl TranslationRow {
    pub fn into_translation(self) -> Result<RefTranslation> {
        Ok(RefTranslation {
            id: uuid_utils::parse_stored("ref_translation", "id", &self.id)?,
            ref_sense_id: uuid_utils::parse_stored("ref_translation", "ref_sense_id", &self.ref_sense_id)?,
            text: self.text,
            source_slug: self.source_slug,
            position: self.position,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ExampleRow {
    pub id: String,
    pub ref_sense_id: String,
    pub sentence: String,
    pub translation: Option<String>,
    pub source_slug: String,
    pub position: i32,
}

impl ExampleRow {
    pub fn into_example(self) -> Result<RefExample> {
        Ok(RefExample {
            id: uuid_utils::parse_stored("ref_example", "id", &self.id)?,
            ref_sense_id: uuid_utils::parse_stored("ref_example", "ref_sense_id", &self.ref_sense_id)?,
            sentence: self.sentence,
            translation: self.translation,
            source_slug: self.source_slug,
            position: self.position,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PronunciationRow {
    pub id: String,
    pub ref_entry_id: String,
    pub transcription: Option<String>,
    pub audio_url: Option<String>,
    pub region: Option<String>,
    pub source_slug: String,
}

impl PronunciationRow {
    pub fn into_pronunciation(self) -> Result<RefPronunciation> {
        Ok(RefPronunciation {
            id: uuid_utils::parse_stored("ref_pronunciation", "id", &self.id)?,
            ref_entry_id: uuid_utils::parse_stored(
                "ref_pronunciation",
                "ref_entry_id",
                &self.ref_entry_id,
            )?,
            transcription: transcription_from_stored(self.transcription),
            audio_url: self.audio_url,
            region: self.region,
            source_slug: self.source_slug,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ImageRow {
    pub id: String,
    pub ref_entry_id: String,
    pub url: String,
    pub caption: Option<String>,
    pub source_slug: String,
}

impl ImageRow {
    pub fn into_image(self) -> Result<RefImage> {
        Ok(RefImage {
            id: uuid_utils::parse_stored("ref_image", "id", &self.id)?,
            ref_entry_id: uuid_utils::parse_stored("ref_image", "ref_entry_id", &self.ref_entry_id)?,
            url: self.url,
            caption: self.caption,
            source_slug: self.source_slug,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct RelationRow {
    pub id: String,
    pub source_entry_id: String,
    pub target_entry_id: String,
    pub relation_type: String,
    pub source_slug: String,
    pub created_at: String,
}

impl RelationRow {
    pub fn into_relation(self) -> Result<RefWordRelation> {
        Ok(RefWordRelation {
            id: uuid_utils::parse_stored("ref_word_relation", "id", &self.id)?,
            source_entry_id: uuid_utils::parse_stored(
                "ref_word_relation",
                "source_entry_id",
                &self.source_entry_id,
            )?,
            target_entry_id: uuid_utils::parse_stored(
                "ref_word_relation",
                "target_entry_id",
                &self.target_entry_id,
            )?,
            relation_type: self.relation_type,
            source_slug: self.source_slug,
            created_at: time::parse_stored("ref_word_relation", "created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct CoverageRow {
    pub ref_entry_id: String,
    pub source_slug: String,
    pub status: String,
    pub dataset_version: Option<String>,
    pub fetched_at: String,
}

impl CoverageRow {
    pub fn into_coverage(self) -> Result<RefEntrySourceCoverage> {
        let status = self.status.parse::<CoverageStatus>().map_err(|_| {
            Error::Internal(format!(
                "coverage {}/{} holds unknown status {:?}",
                self.ref_entry_id, self.source_slug, self.status
            ))
        })?;
        Ok(RefEntrySourceCoverage {
            ref_entry_id: uuid_utils::parse_stored("coverage", "ref_entry_id", &self.ref_entry_id)?,
            source_slug: self.source_slug,
            status,
            dataset_version: self.dataset_version,
            fetched_at: time::parse_stored("coverage", "fetched_at", &self.fetched_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct DataSourceRow {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub source_type: String,
    pub is_active: bool,
    pub dataset_version: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DataSourceRow {
    pub fn into_data_source(self) -> Result<RefDataSource> {
        Ok(RefDataSource {
            created_at: time::parse_stored("ref_data_source", "created_at", &self.created_at)?,
            updated_at: time::parse_stored("ref_data_source", "updated_at", &self.updated_at)?,
            slug: self.slug,
            name: self.name,
            description: self.description,
            source_type: self.source_type,
            is_active: self.is_active,
            dataset_version: self.dataset_version,
        })
    }
}

/// Stored form of an optional transcription (never NULL)
pub fn transcription_to_stored(transcription: &Option<String>) -> &str {
    transcription.as_deref().unwrap_or("")
}

/// An empty stored transcription reads back as absent
pub fn transcription_from_stored(stored: Option<String>) -> Option<String> {
    stored.filter(|t| !t.is_empty())
}

/// Stored form of an optional part of speech
pub fn part_of_speech_to_stored(pos: Option<PartOfSpeech>) -> Option<&'static str> {
    pos.map(|p| p.as_str())
}
