//! Catalog facade
//!
//! The in-process contract used by ingestion workers, the enrichment worker,
//! read-side resolvers and registry administration. Inputs are validated
//! here before anything reaches storage; everything else delegates to
//! [`RefRepository`].

use std::collections::{HashMap, HashSet};

use refcat_common::config::CatalogConfig;
use refcat_common::db::init::init_database;
use refcat_common::db::models::{
    CoverageStatus, EntryKey, EntryMetadataUpdate, RefDataSource, RefEntry, RefEntrySourceCoverage,
    RefExample, RefImage, RefPronunciation, RefSense, RefTranslation, RefWordRelation,
};
use refcat_common::normalize::normalize_text;
use refcat_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::reconcile::ReconcileSummary;
use crate::db::{RefRepository, RepoSettings};

/// Reference catalog entry point
#[derive(Debug, Clone)]
pub struct Catalog {
    repo: RefRepository,
}

impl Catalog {
    /// Open (creating and migrating if needed) the configured database
    pub async fn open(config: &CatalogConfig) -> Result<Self> {
        let pool = init_database(config).await?;
        Ok(Self::new(RefRepository::new(pool, RepoSettings::from(config))))
    }

    pub fn new(repo: RefRepository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &RefRepository {
        &self.repo
    }

    // ------------------------------------------------------------------
    // Ingestion workers
    // ------------------------------------------------------------------

    /// Get-or-create the root entry for `normalized_text`
    pub async fn register_entry(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        text: &str,
        normalized_text: &str,
    ) -> Result<RefEntry> {
        validate_entry_text(id, text, normalized_text)?;
        self.repo.get_or_create(cancel, id, text, normalized_text).await
    }

    /// Write a complete aggregate in one transaction
    pub async fn create_entry_with_tree(&self, cancel: &CancellationToken, entry: &RefEntry) -> Result<RefEntry> {
        validate_entry_text(entry.id, &entry.text, &entry.text_normalized)?;
        for sense in &entry.senses {
            validate_sense(sense)?;
            for translation in &sense.translations {
                validate_slug("ref_translation", translation.id, &translation.source_slug)?;
            }
            for example in &sense.examples {
                validate_slug("ref_example", example.id, &example.source_slug)?;
            }
        }
        for pronunciation in &entry.pronunciations {
            validate_slug("ref_pronunciation", pronunciation.id, &pronunciation.source_slug)?;
        }
        for image in &entry.images {
            validate_image(image)?;
        }
        self.repo.create_with_tree(cancel, entry).await
    }

    pub async fn register_entries(&self, cancel: &CancellationToken, entries: &[RefEntry]) -> Result<usize> {
        for entry in entries {
            validate_entry_text(entry.id, &entry.text, &entry.text_normalized)?;
        }
        self.repo.bulk_insert_entries(cancel, entries).await
    }

    pub async fn attach_senses(&self, cancel: &CancellationToken, senses: &[RefSense]) -> Result<usize> {
        for sense in senses {
            validate_sense(sense)?;
        }
        self.repo.bulk_insert_senses(cancel, senses).await
    }

    pub async fn attach_translations(
        &self,
        cancel: &CancellationToken,
        translations: &[RefTranslation],
    ) -> Result<usize> {
        for translation in translations {
            validate_slug("ref_translation", translation.id, &translation.source_slug)?;
            validate_position("ref_translation", translation.id, translation.position)?;
        }
        self.repo.bulk_insert_translations(cancel, translations).await
    }

    pub async fn attach_examples(&self, cancel: &CancellationToken, examples: &[RefExample]) -> Result<usize> {
        for example in examples {
            validate_slug("ref_example", example.id, &example.source_slug)?;
            validate_position("ref_example", example.id, example.position)?;
        }
        self.repo.bulk_insert_examples(cancel, examples).await
    }

    pub async fn attach_pronunciations(
        &self,
        cancel: &CancellationToken,
        pronunciations: &[RefPronunciation],
    ) -> Result<usize> {
        for pronunciation in pronunciations {
            validate_slug("ref_pronunciation", pronunciation.id, &pronunciation.source_slug)?;
        }
        self.repo.bulk_insert_pronunciations(cancel, pronunciations).await
    }

    pub async fn attach_relations(
        &self,
        cancel: &CancellationToken,
        relations: &[RefWordRelation],
    ) -> Result<usize> {
        for relation in relations {
            validate_slug("ref_word_relation", relation.id, &relation.source_slug)?;
            if relation.relation_type.trim().is_empty() {
                return Err(Error::validation(
                    "ref_word_relation",
                    relation.id,
                    "relation_type must not be empty",
                ));
            }
            if relation.source_entry_id == relation.target_entry_id {
                return Err(Error::validation(
                    "ref_word_relation",
                    relation.id,
                    "an entry cannot relate to itself",
                ));
            }
        }
        self.repo.bulk_insert_relations(cancel, relations).await
    }

    pub async fn mark_coverage(
        &self,
        cancel: &CancellationToken,
        entry_id: Uuid,
        source_slug: &str,
        status: CoverageStatus,
    ) -> Result<()> {
        validate_slug("coverage", entry_id, source_slug)?;
        self.repo
            .mark_coverage(cancel, entry_id, source_slug, status, None)
            .await
    }

    pub async fn mark_coverage_batch(
        &self,
        cancel: &CancellationToken,
        coverage: &[RefEntrySourceCoverage],
    ) -> Result<usize> {
        for record in coverage {
            validate_slug("coverage", record.ref_entry_id, &record.source_slug)?;
        }
        self.repo.bulk_insert_coverage(cancel, coverage).await
    }

    pub async fn update_entry_metadata(
        &self,
        cancel: &CancellationToken,
        updates: &[EntryMetadataUpdate],
    ) -> Result<usize> {
        self.repo.bulk_update_entry_metadata(cancel, updates).await
    }

    pub async fn entry_ids_by_normalized_texts(
        &self,
        cancel: &CancellationToken,
        texts: &[String],
    ) -> Result<HashMap<String, Uuid>> {
        self.repo.get_entry_ids_by_normalized_texts(cancel, texts).await
    }

    pub async fn all_normalized_texts(&self, cancel: &CancellationToken) -> Result<HashSet<String>> {
        self.repo.get_all_normalized_texts(cancel).await
    }

    pub async fn first_sense_ids(
        &self,
        cancel: &CancellationToken,
        entry_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Uuid>> {
        self.repo.get_first_sense_ids_by_entry_ids(cancel, entry_ids).await
    }

    pub async fn pronunciation_transcriptions(
        &self,
        cancel: &CancellationToken,
        entry_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, HashSet<String>>> {
        self.repo
            .get_pronunciation_transcriptions_by_entry_ids(cancel, entry_ids)
            .await
    }

    // ------------------------------------------------------------------
    // Enrichment worker
    // ------------------------------------------------------------------

    pub async fn reconcile_content(
        &self,
        cancel: &CancellationToken,
        entry_id: Uuid,
        new_senses: &[RefSense],
        new_translations: &[RefTranslation],
        new_examples: &[RefExample],
    ) -> Result<ReconcileSummary> {
        for sense in new_senses {
            validate_sense(sense)?;
        }
        for translation in new_translations {
            validate_slug("ref_translation", translation.id, &translation.source_slug)?;
            validate_position("ref_translation", translation.id, translation.position)?;
        }
        for example in new_examples {
            validate_slug("ref_example", example.id, &example.source_slug)?;
            validate_position("ref_example", example.id, example.position)?;
        }
        self.repo
            .reconcile_content(cancel, entry_id, new_senses, new_translations, new_examples)
            .await
    }

    // ------------------------------------------------------------------
    // Read-side resolvers
    // ------------------------------------------------------------------

    /// Full aggregate by id or by text (normalized before lookup)
    pub async fn get_full_tree(&self, cancel: &CancellationToken, key: EntryKey) -> Result<RefEntry> {
        let key = match key {
            EntryKey::Text(text) => EntryKey::Text(normalize_text(&text)),
            id => id,
        };
        self.repo.get_full_tree(cancel, &key).await
    }

    pub async fn batch_get_senses(&self, cancel: &CancellationToken, ids: &[Uuid]) -> Result<Vec<RefSense>> {
        self.repo.batch_get_senses(cancel, ids).await
    }

    pub async fn batch_get_translations(
        &self,
        cancel: &CancellationToken,
        ids: &[Uuid],
    ) -> Result<Vec<RefTranslation>> {
        self.repo.batch_get_translations(cancel, ids).await
    }

    pub async fn batch_get_examples(&self, cancel: &CancellationToken, ids: &[Uuid]) -> Result<Vec<RefExample>> {
        self.repo.batch_get_examples(cancel, ids).await
    }

    pub async fn batch_get_pronunciations(
        &self,
        cancel: &CancellationToken,
        ids: &[Uuid],
    ) -> Result<Vec<RefPronunciation>> {
        self.repo.batch_get_pronunciations(cancel, ids).await
    }

    pub async fn batch_get_images(&self, cancel: &CancellationToken, ids: &[Uuid]) -> Result<Vec<RefImage>> {
        self.repo.batch_get_images(cancel, ids).await
    }

    pub async fn search(&self, cancel: &CancellationToken, query: &str, limit: i64) -> Result<Vec<RefEntry>> {
        self.repo.search(cancel, query, limit).await
    }

    pub async fn get_relations(&self, cancel: &CancellationToken, entry_id: Uuid) -> Result<Vec<RefWordRelation>> {
        self.repo.get_relations(cancel, entry_id).await
    }

    pub async fn get_coverage(
        &self,
        cancel: &CancellationToken,
        entry_id: Uuid,
    ) -> Result<Vec<RefEntrySourceCoverage>> {
        self.repo.get_coverage(cancel, entry_id).await
    }

    pub async fn get_coverage_batch(
        &self,
        cancel: &CancellationToken,
        entry_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<RefEntrySourceCoverage>>> {
        self.repo.get_coverage_batch(cancel, entry_ids).await
    }

    // ------------------------------------------------------------------
    // Source registry
    // ------------------------------------------------------------------

    pub async fn upsert_data_sources(&self, cancel: &CancellationToken, sources: &[RefDataSource]) -> Result<()> {
        for source in sources {
            validate_slug("ref_data_source", &source.slug, &source.slug)?;
            if source.name.trim().is_empty() {
                return Err(Error::validation("ref_data_source", &source.slug, "name must not be empty"));
            }
        }
        self.repo.upsert_data_sources(cancel, sources).await
    }

    pub async fn get_all_data_sources(&self, cancel: &CancellationToken) -> Result<Vec<RefDataSource>> {
        self.repo.get_all_data_sources(cancel).await
    }

    pub async fn get_data_source_by_slug(&self, cancel: &CancellationToken, slug: &str) -> Result<RefDataSource> {
        self.repo.get_data_source_by_slug(cancel, slug).await
    }
}

fn validate_entry_text(id: Uuid, text: &str, normalized_text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::validation("ref_entry", id, "text must not be empty"));
    }
    if normalized_text.is_empty() {
        return Err(Error::validation("ref_entry", id, "normalized text must not be empty"));
    }
    if normalize_text(normalized_text) != normalized_text {
        return Err(Error::validation(
            "ref_entry",
            id,
            format!("{:?} is not in normalized form", normalized_text),
        ));
    }
    Ok(())
}

fn validate_sense(sense: &RefSense) -> Result<()> {
    validate_slug("ref_sense", sense.id, &sense.source_slug)?;
    validate_position("ref_sense", sense.id, sense.position)
}

fn validate_image(image: &RefImage) -> Result<()> {
    validate_slug("ref_image", image.id, &image.source_slug)?;
    if image.url.trim().is_empty() {
        return Err(Error::validation("ref_image", image.id, "url must not be empty"));
    }
    Ok(())
}

fn validate_position(entity: &'static str, id: Uuid, position: i32) -> Result<()> {
    if position < 0 {
        return Err(Error::validation(entity, id, "position must not be negative"));
    }
    Ok(())
}

/// Source slugs are lowercase `[a-z0-9_-]+`
fn validate_slug(entity: &'static str, id: impl std::fmt::Display, slug: &str) -> Result<()> {
    let well_formed = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !well_formed {
        return Err(Error::validation(
            entity,
            id,
            format!("invalid source slug {:?}", slug),
        ));
    }
    Ok(())
}
