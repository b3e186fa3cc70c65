//! Aggregate Reader
//!
//! Full-tree loads run in one read transaction so a concurrent
//! reconciliation is seen either entirely or not at all.

use std::collections::HashMap;

use refcat_common::db::models::{
    EntryKey, RefEntry, RefExample, RefImage, RefPronunciation, RefSense, RefTranslation,
};
use refcat_common::Result;
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::classify::ClassifyExt;
use super::mapper::{
    EntryRow, ExampleRow, ImageRow, PronunciationRow, SenseRow, TranslationRow, ENTRY_COLUMNS,
    EXAMPLE_COLUMNS, IMAGE_COLUMNS, PRONUNCIATION_COLUMNS, SENSE_COLUMNS, TRANSLATION_COLUMNS,
};
use super::{fetch_in_chunks, id_strings, RefRepository};
use crate::utils::{begin_monitored, cancellable};

impl RefRepository {
    /// Load an entry with all of its children.
    ///
    /// Returns `NotFound` when the root row does not exist. Missing child
    /// collections come back empty.
    pub async fn get_full_tree(&self, cancel: &CancellationToken, key: &EntryKey) -> Result<RefEntry> {
        cancellable(cancel, async {
            let mut tx = begin_monitored(&self.pool, "reader::get_full_tree").await?;
            let mut entry = load_entry_row(&mut tx, key).await?;
            load_children(&mut tx, &mut entry, self.settings.bulk_chunk_size).await?;
            tx.commit().await?;
            Ok(entry)
        })
        .await
    }

    pub async fn batch_get_senses(&self, cancel: &CancellationToken, ids: &[Uuid]) -> Result<Vec<RefSense>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("reader::batch_get_senses").await?;
            let rows: Vec<SenseRow> = fetch_in_chunks(
                &mut conn,
                &format!("SELECT {} FROM ref_senses", SENSE_COLUMNS),
                "id",
                &id_strings(ids),
                "ref_entry_id, position, id",
                self.settings.bulk_chunk_size,
                "ref_sense",
            )
            .await?;
            debug!(requested = ids.len(), found = rows.len(), "Batch loaded senses");
            rows.into_iter().map(SenseRow::into_sense).collect()
        })
        .await
    }

    pub async fn batch_get_translations(
        &self,
        cancel: &CancellationToken,
        ids: &[Uuid],
    ) -> Result<Vec<RefTranslation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("reader::batch_get_translations").await?;
            let rows: Vec<TranslationRow> = fetch_in_chunks(
                &mut conn,
                &format!("SELECT {} FROM ref_translations", TRANSLATION_COLUMNS),
                "id",
                &id_strings(ids),
                "ref_sense_id, position, id",
                self.settings.bulk_chunk_size,
                "ref_translation",
            )
            .await?;
            rows.into_iter().map(TranslationRow::into_translation).collect()
        })
        .await
    }

    pub async fn batch_get_examples(&self, cancel: &CancellationToken, ids: &[Uuid]) -> Result<Vec<RefExample>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("reader::batch_get_examples").await?;
            let rows: Vec<ExampleRow> = fetch_in_chunks(
                &mut conn,
                &format!("SELECT {} FROM ref_examples", EXAMPLE_COLUMNS),
                "id",
                &id_strings(ids),
                "ref_sense_id, position, id",
                self.settings.bulk_chunk_size,
                "ref_example",
            )
            .await?;
            rows.into_iter().map(ExampleRow::into_example).collect()
        })
        .await
    }

    pub async fn batch_get_pronunciations(
        &self,
        cancel: &CancellationToken,
        ids: &[Uuid],
    ) -> Result<Vec<RefPronunciation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("reader::batch_get_pronunciations").await?;
            let rows: Vec<PronunciationRow> = fetch_in_chunks(
                &mut conn,
                &format!("SELECT {} FROM ref_pronunciations", PRONUNCIATION_COLUMNS),
                "id",
                &id_strings(ids),
                "ref_entry_id, rowid",
                self.settings.bulk_chunk_size,
                "ref_pronunciation",
            )
            .await?;
            rows.into_iter().map(PronunciationRow::into_pronunciation).collect()
        })
        .await
    }

    pub async fn batch_get_images(&self, cancel: &CancellationToken, ids: &[Uuid]) -> Result<Vec<RefImage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("reader::batch_get_images").await?;
            let rows: Vec<ImageRow> = fetch_in_chunks(
                &mut conn,
                &format!("SELECT {} FROM ref_images", IMAGE_COLUMNS),
                "id",
                &id_strings(ids),
                "ref_entry_id, rowid",
                self.settings.bulk_chunk_size,
                "ref_image",
            )
            .await?;
            rows.into_iter().map(ImageRow::into_image).collect()
        })
        .await
    }
}

/// Root row only, children empty
pub(crate) async fn load_entry_row(conn: &mut SqliteConnection, key: &EntryKey) -> Result<RefEntry> {
    let row: EntryRow = match key {
        EntryKey::Id(id) => {
            sqlx::query_as(&format!("SELECT {} FROM ref_entries WHERE id = ?", ENTRY_COLUMNS))
                .bind(id.to_string())
                .fetch_one(&mut *conn)
                .await
                .classify("get", "ref_entry", id)?
        }
        EntryKey::Text(text) => sqlx::query_as(&format!(
            "SELECT {} FROM ref_entries WHERE text_normalized = ?",
            ENTRY_COLUMNS
        ))
        .bind(text.as_str())
        .fetch_one(&mut *conn)
        .await
        .classify("get", "ref_entry", key)?,
    };
    row.into_entry()
}

/// Fill senses (with translations and examples), pronunciations and images.
///
/// Translations and examples for all senses are fetched with one query each
/// and grouped in memory.
pub(crate) async fn load_children(
    conn: &mut SqliteConnection,
    entry: &mut RefEntry,
    chunk_size: usize,
) -> Result<()> {
    let entry_id = entry.id.to_string();

    let sense_rows: Vec<SenseRow> = sqlx::query_as(&format!(
        "SELECT {} FROM ref_senses WHERE ref_entry_id = ? ORDER BY position, id",
        SENSE_COLUMNS
    ))
    .bind(&entry_id)
    .fetch_all(&mut *conn)
    .await
    .classify("load_senses", "ref_entry", entry.id)?;

    let mut senses = sense_rows
        .into_iter()
        .map(SenseRow::into_sense)
        .collect::<Result<Vec<_>>>()?;

    if !senses.is_empty() {
        let sense_ids: Vec<String> = senses.iter().map(|s| s.id.to_string()).collect();

        let translation_rows: Vec<TranslationRow> = fetch_in_chunks(
            &mut *conn,
            &format!("SELECT {} FROM ref_translations", TRANSLATION_COLUMNS),
            "ref_sense_id",
            &sense_ids,
            "position, id",
            chunk_size,
            "ref_translation",
        )
        .await?;
        let example_rows: Vec<ExampleRow> = fetch_in_chunks(
            &mut *conn,
            &format!("SELECT {} FROM ref_examples", EXAMPLE_COLUMNS),
            "ref_sense_id",
            &sense_ids,
            "position, id",
            chunk_size,
            "ref_example",
        )
        .await?;

        let mut translations_by_sense: HashMap<Uuid, Vec<RefTranslation>> = HashMap::new();
        for row in translation_rows {
            let translation = row.into_translation()?;
            translations_by_sense
                .entry(translation.ref_sense_id)
                .or_default()
                .push(translation);
        }

        let mut examples_by_sense: HashMap<Uuid, Vec<RefExample>> = HashMap::new();
        for row in example_rows {
            let example = row.into_example()?;
            examples_by_sense
                .entry(example.ref_sense_id)
                .or_default()
                .push(example);
        }

        for sense in &mut senses {
            sense.translations = translations_by_sense.remove(&sense.id).unwrap_or_default();
            sense.translations.sort_by_key(|t| t.position);
            sense.examples = examples_by_sense.remove(&sense.id).unwrap_or_default();
            sense.examples.sort_by_key(|e| e.position);
        }
    }

    let pronunciation_rows: Vec<PronunciationRow> = sqlx::query_as(&format!(
        "SELECT {} FROM ref_pronunciations WHERE ref_entry_id = ? ORDER BY rowid",
        PRONUNCIATION_COLUMNS
    ))
    .bind(&entry_id)
    .fetch_all(&mut *conn)
    .await
    .classify("load_pronunciations", "ref_entry", entry.id)?;

    let image_rows: Vec<ImageRow> = sqlx::query_as(&format!(
        "SELECT {} FROM ref_images WHERE ref_entry_id = ? ORDER BY rowid",
        IMAGE_COLUMNS
    ))
    .bind(&entry_id)
    .fetch_all(&mut *conn)
    .await
    .classify("load_images", "ref_entry", entry.id)?;

    entry.senses = senses;
    entry.pronunciations = pronunciation_rows
        .into_iter()
        .map(PronunciationRow::into_pronunciation)
        .collect::<Result<_>>()?;
    entry.images = image_rows
        .into_iter()
        .map(ImageRow::into_image)
        .collect::<Result<_>>()?;

    debug!(
        entry_id = %entry.id,
        senses = entry.senses.len(),
        pronunciations = entry.pronunciations.len(),
        images = entry.images.len(),
        "Loaded full tree"
    );

    Ok(())
}
