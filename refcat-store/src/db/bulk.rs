//! Bulk Ingestion Pipeline
//!
//! Grouped multi-row statements for ingestion workers. Every insert is
//! conflict-skip and reports the number of rows actually written, so a
//! batch can be re-run against a partially completed earlier run. Coverage
//! is the exception: it upserts so the record reflects the latest attempt.
//!
//! The lookup helpers let a worker pre-filter candidates in memory; the
//! inserts stay conflict-safe without them.

use std::collections::{HashMap, HashSet};

use refcat_common::db::models::{
    EntryMetadataUpdate, RefEntry, RefEntrySourceCoverage, RefExample, RefPronunciation, RefSense,
    RefTranslation, RefWordRelation,
};
use refcat_common::db::trigram_index::index_entry;
use refcat_common::{time, uuid_utils, Result};
use sqlx::query_builder::Separated;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::classify::ClassifyExt;
use super::mapper::{part_of_speech_to_stored, transcription_from_stored, transcription_to_stored};
use super::{fetch_in_chunks, id_strings, RefRepository};
use crate::utils::{begin_monitored, cancellable, retry_on_lock};

impl RefRepository {
    /// Insert entries, skipping any whose normalized text already exists.
    ///
    /// Trigram rows are written only for the entries actually inserted.
    pub async fn bulk_insert_entries(&self, cancel: &CancellationToken, entries: &[RefEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        cancellable(
            cancel,
            retry_on_lock("bulk_insert_entries", self.settings.max_lock_wait_ms, move || async move {
                let mut tx = begin_monitored(&self.pool, "bulk::insert_entries").await?;
                let mut inserted = 0usize;

                for chunk in entries.chunks(self.settings.bulk_chunk_size) {
                    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                        "INSERT INTO ref_entries (id, text, text_normalized, frequency_rank, cefr_level, is_core_lexicon, created_at) ",
                    );
                    builder.push_values(chunk, |mut row, entry| {
                        row.push_bind(entry.id.to_string())
                            .push_bind(entry.text.as_str())
                            .push_bind(entry.text_normalized.as_str())
                            .push_bind(entry.frequency_rank)
                            .push_bind(entry.cefr_level.as_deref())
                            .push_bind(entry.is_core_lexicon)
                            .push_bind(time::to_stored(&entry.created_at));
                    });
                    builder.push(" ON CONFLICT (text_normalized) DO NOTHING RETURNING id");

                    let inserted_ids: Vec<String> = builder
                        .build_query_scalar::<String>()
                        .fetch_all(&mut *tx)
                        .await
                        .classify("bulk_insert", "ref_entry", format!("{} rows", chunk.len()))?;

                    let inserted_ids: HashSet<String> = inserted_ids.into_iter().collect();
                    for entry in chunk {
                        if inserted_ids.contains(&entry.id.to_string()) {
                            index_entry(&mut tx, &entry.id, &entry.text_normalized).await?;
                        }
                    }
                    inserted += inserted_ids.len();
                }

                tx.commit().await?;
                Ok(inserted)
            }),
        )
        .await
        .map(|inserted| log_inserted("ref_entries", entries.len(), inserted))
    }

    /// Insert senses, skipping existing ids
    pub async fn bulk_insert_senses(&self, cancel: &CancellationToken, senses: &[RefSense]) -> Result<usize> {
        self.bulk_insert(
            cancel,
            "ref_sense",
            "INSERT INTO ref_senses (id, ref_entry_id, definition, part_of_speech, cefr_level, notes, source_slug, position, created_at) ",
            "ON CONFLICT DO NOTHING",
            senses,
            |mut row, sense| {
                row.push_bind(sense.id.to_string())
                    .push_bind(sense.ref_entry_id.to_string())
                    .push_bind(sense.definition.as_deref())
                    .push_bind(part_of_speech_to_stored(sense.part_of_speech))
                    .push_bind(sense.cefr_level.as_deref())
                    .push_bind(sense.notes.as_deref())
                    .push_bind(sense.source_slug.as_str())
                    .push_bind(sense.position)
                    .push_bind(time::to_stored(&sense.created_at));
            },
        )
        .await
    }

    /// Insert translations, skipping existing ids
    pub async fn bulk_insert_translations(
        &self,
        cancel: &CancellationToken,
        translations: &[RefTranslation],
    ) -> Result<usize> {
        self.bulk_insert(
            cancel,
            "ref_translation",
            "INSERT INTO ref_translations (id, ref_sense_id, text, source_slug, position) ",
            "ON CONFLICT DO NOTHING",
            translations,
            |mut row, translation| {
                row.push_bind(translation.id.to_string())
                    .push_bind(translation.ref_sense_id.to_string())
                    .push_bind(translation.text.as_str())
                    .push_bind(translation.source_slug.as_str())
                    .push_bind(translation.position);
            },
        )
        .await
    }

    /// Insert examples, skipping existing ids
    pub async fn bulk_insert_examples(&self, cancel: &CancellationToken, examples: &[RefExample]) -> Result<usize> {
        self.bulk_insert(
            cancel,
            "ref_example",
            "INSERT INTO ref_examples (id, ref_sense_id, sentence, translation, source_slug, position) ",
            "ON CONFLICT DO NOTHING",
            examples,
            |mut row, example| {
                row.push_bind(example.id.to_string())
                    .push_bind(example.ref_sense_id.to_string())
                    .push_bind(example.sentence.as_str())
                    .push_bind(example.translation.as_deref())
                    .push_bind(example.source_slug.as_str())
                    .push_bind(example.position);
            },
        )
        .await
    }

    /// Insert pronunciations, skipping existing ids
    pub async fn bulk_insert_pronunciations(
        &self,
        cancel: &CancellationToken,
        pronunciations: &[RefPronunciation],
    ) -> Result<usize> {
        self.bulk_insert(
            cancel,
            "ref_pronunciation",
            "INSERT INTO ref_pronunciations (id, ref_entry_id, transcription, audio_url, region, source_slug) ",
            "ON CONFLICT DO NOTHING",
            pronunciations,
            |mut row, pronunciation| {
                row.push_bind(pronunciation.id.to_string())
                    .push_bind(pronunciation.ref_entry_id.to_string())
                    .push_bind(transcription_to_stored(&pronunciation.transcription))
                    .push_bind(pronunciation.audio_url.as_deref())
                    .push_bind(pronunciation.region.as_deref())
                    .push_bind(pronunciation.source_slug.as_str());
            },
        )
        .await
    }

    /// Insert relations, skipping existing (source, target, type) edges
    pub async fn bulk_insert_relations(
        &self,
        cancel: &CancellationToken,
        relations: &[RefWordRelation],
    ) -> Result<usize> {
        self.bulk_insert(
            cancel,
            "ref_word_relation",
            "INSERT INTO ref_word_relations (id, source_entry_id, target_entry_id, relation_type, source_slug, created_at) ",
            "ON CONFLICT DO NOTHING",
            relations,
            |mut row, relation| {
                row.push_bind(relation.id.to_string())
                    .push_bind(relation.source_entry_id.to_string())
                    .push_bind(relation.target_entry_id.to_string())
                    .push_bind(relation.relation_type.as_str())
                    .push_bind(relation.source_slug.as_str())
                    .push_bind(time::to_stored(&relation.created_at));
            },
        )
        .await
    }

    /// Upsert coverage records; an existing (entry, source) pair takes the
    /// new status and fetched_at
    pub async fn bulk_insert_coverage(
        &self,
        cancel: &CancellationToken,
        coverage: &[RefEntrySourceCoverage],
    ) -> Result<usize> {
        self.bulk_insert(
            cancel,
            "coverage",
            "INSERT INTO ref_entry_source_coverage (ref_entry_id, source_slug, status, dataset_version, fetched_at) ",
            "ON CONFLICT (ref_entry_id, source_slug) DO UPDATE SET status = excluded.status, fetched_at = excluded.fetched_at",
            coverage,
            |mut row, record| {
                row.push_bind(record.ref_entry_id.to_string())
                    .push_bind(record.source_slug.as_str())
                    .push_bind(record.status.as_str())
                    .push_bind(record.dataset_version.as_deref().filter(|v| !v.is_empty()))
                    .push_bind(time::to_stored(&record.fetched_at));
            },
        )
        .await
    }

    /// Apply metadata by normalized text; `None` fields keep their value.
    ///
    /// Returns the number of entries matched.
    pub async fn bulk_update_entry_metadata(
        &self,
        cancel: &CancellationToken,
        updates: &[EntryMetadataUpdate],
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        cancellable(
            cancel,
            retry_on_lock("bulk_update_entry_metadata", self.settings.max_lock_wait_ms, move || async move {
                let mut tx = begin_monitored(&self.pool, "bulk::update_entry_metadata").await?;
                let mut updated = 0u64;
                for update in updates {
                    updated += sqlx::query(
                        r#"
                        UPDATE ref_entries
                        SET frequency_rank = COALESCE(?, frequency_rank),
                            cefr_level = COALESCE(?, cefr_level),
                            is_core_lexicon = COALESCE(?, is_core_lexicon)
                        WHERE text_normalized = ?
                        "#,
                    )
                    .bind(update.frequency_rank)
                    .bind(update.cefr_level.as_deref())
                    .bind(update.is_core_lexicon)
                    .bind(update.text_normalized.as_str())
                    .execute(&mut *tx)
                    .await
                    .classify("update_metadata", "ref_entry", &update.text_normalized)?
                    .rows_affected();
                }
                tx.commit().await?;
                Ok(updated as usize)
            }),
        )
        .await
        .map(|updated| {
            info!(requested = updates.len(), updated, "Updated ref entry metadata");
            updated
        })
    }

    /// Map of normalized text to entry id for the texts that exist
    pub async fn get_entry_ids_by_normalized_texts(
        &self,
        cancel: &CancellationToken,
        texts: &[String],
    ) -> Result<HashMap<String, Uuid>> {
        if texts.is_empty() {
            return Ok(HashMap::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("bulk::entry_ids_by_texts").await?;
            let rows: Vec<(String, String)> = fetch_in_chunks(
                &mut conn,
                "SELECT text_normalized, id FROM ref_entries",
                "text_normalized",
                texts,
                "",
                self.settings.bulk_chunk_size,
                "ref_entry",
            )
            .await?;

            let mut ids = HashMap::with_capacity(rows.len());
            for (text, id) in rows {
                ids.insert(text, uuid_utils::parse_stored("ref_entry", "id", &id)?);
            }
            debug!(requested = texts.len(), found = ids.len(), "Looked up entry ids by text");
            Ok(ids)
        })
        .await
    }

    /// Every normalized text in the catalog
    pub async fn get_all_normalized_texts(&self, cancel: &CancellationToken) -> Result<HashSet<String>> {
        cancellable(cancel, async {
            let texts: Vec<String> = sqlx::query_scalar("SELECT text_normalized FROM ref_entries")
                .fetch_all(&self.pool)
                .await
                .classify("list", "ref_entry", "all")?;
            debug!(count = texts.len(), "Loaded all normalized texts");
            Ok(texts.into_iter().collect())
        })
        .await
    }

    /// Lowest-position sense id per entry, for entries that have senses
    pub async fn get_first_sense_ids_by_entry_ids(
        &self,
        cancel: &CancellationToken,
        entry_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Uuid>> {
        if entry_ids.is_empty() {
            return Ok(HashMap::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("bulk::first_sense_ids").await?;
            let rows: Vec<(String, String, i32)> = fetch_in_chunks(
                &mut conn,
                "SELECT ref_entry_id, id, position FROM ref_senses",
                "ref_entry_id",
                &id_strings(entry_ids),
                "ref_entry_id, position, id",
                self.settings.bulk_chunk_size,
                "ref_sense",
            )
            .await?;

            let mut first: HashMap<Uuid, Uuid> = HashMap::with_capacity(entry_ids.len());
            for (entry_id, sense_id, _position) in rows {
                let entry_id = uuid_utils::parse_stored("ref_sense", "ref_entry_id", &entry_id)?;
                if !first.contains_key(&entry_id) {
                    first.insert(entry_id, uuid_utils::parse_stored("ref_sense", "id", &sense_id)?);
                }
            }
            Ok(first)
        })
        .await
    }

    /// Stored transcriptions per entry, for skipping duplicate pronunciations.
    ///
    /// Pronunciations without a transcription are left out, so an entry
    /// holding only those has no key in the result.
    pub async fn get_pronunciation_transcriptions_by_entry_ids(
        &self,
        cancel: &CancellationToken,
        entry_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, HashSet<String>>> {
        if entry_ids.is_empty() {
            return Ok(HashMap::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("bulk::pronunciation_transcriptions").await?;
            let rows: Vec<(String, String)> = fetch_in_chunks(
                &mut conn,
                "SELECT ref_entry_id, transcription FROM ref_pronunciations",
                "ref_entry_id",
                &id_strings(entry_ids),
                "",
                self.settings.bulk_chunk_size,
                "ref_pronunciation",
            )
            .await?;

            let mut by_entry: HashMap<Uuid, HashSet<String>> = HashMap::new();
            for (entry_id, transcription) in rows {
                let Some(transcription) = transcription_from_stored(Some(transcription)) else {
                    continue;
                };
                let entry_id = uuid_utils::parse_stored("ref_pronunciation", "ref_entry_id", &entry_id)?;
                by_entry.entry(entry_id).or_default().insert(transcription);
            }
            Ok(by_entry)
        })
        .await
    }

    /// Shared body of the multi-row conflict-skip inserts
    async fn bulk_insert<'t, T, F>(
        &self,
        cancel: &CancellationToken,
        entity: &'static str,
        head: &'static str,
        on_conflict: &'static str,
        rows: &'t [T],
        bind_row: F,
    ) -> Result<usize>
    where
        T: Sync,
        F: Fn(Separated<'_, 't, Sqlite, &'static str>, &'t T),
    {
        if rows.is_empty() {
            return Ok(0);
        }
        let bind_row = &bind_row;
        cancellable(
            cancel,
            retry_on_lock(entity, self.settings.max_lock_wait_ms, move || async move {
                let mut tx = begin_monitored(&self.pool, "bulk::insert").await?;
                let affected = insert_chunked(
                    &mut tx,
                    head,
                    on_conflict,
                    rows,
                    self.settings.bulk_chunk_size,
                    entity,
                    bind_row,
                )
                .await?;
                tx.commit().await?;
                Ok(affected)
            }),
        )
        .await
        .map(|affected| log_inserted(entity, rows.len(), affected))
    }
}

async fn insert_chunked<'t, T, F>(
    conn: &mut SqliteConnection,
    head: &str,
    on_conflict: &str,
    rows: &'t [T],
    chunk_size: usize,
    entity: &'static str,
    bind_row: &F,
) -> Result<usize>
where
    F: Fn(Separated<'_, 't, Sqlite, &'static str>, &'t T),
{
    let mut affected = 0u64;
    for chunk in rows.chunks(chunk_size.max(1)) {
        let mut builder: QueryBuilder<'t, Sqlite> = QueryBuilder::new(head);
        builder.push_values(chunk, |row, item| bind_row(row, item));
        builder.push(" ").push(on_conflict);

        affected += builder
            .build()
            .execute(&mut *conn)
            .await
            .classify("bulk_insert", entity, format!("{} rows", chunk.len()))?
            .rows_affected();
    }
    Ok(affected as usize)
}

fn log_inserted(entity: &str, requested: usize, inserted: usize) -> usize {
    debug!(
        entity,
        requested,
        inserted,
        skipped = requested.saturating_sub(inserted),
        "Bulk insert finished"
    );
    inserted
}
