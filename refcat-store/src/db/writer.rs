//! Aggregate Writer
//!
//! `create_with_tree` writes a whole aggregate in one transaction;
//! `get_or_create` guarantees only the root row.

use refcat_common::db::models::{
    EntryKey, RefEntry, RefExample, RefImage, RefPronunciation, RefSense, RefTranslation,
};
use refcat_common::db::trigram_index::index_entry;
use refcat_common::{time, Result};
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::classify::ClassifyExt;
use super::mapper::{part_of_speech_to_stored, transcription_to_stored};
use super::reader::load_entry_row;
use super::RefRepository;
use crate::utils::{begin_monitored, cancellable, retry_on_lock};

impl RefRepository {
    /// Insert an entry and all of its children atomically.
    ///
    /// Children are written in a fixed order: each sense followed by its
    /// translations and examples, then pronunciations, then images. Owner
    /// ids on children are taken from their parent, not from the input.
    /// Server-assigned timestamps in the result come from the inserted rows.
    pub async fn create_with_tree(&self, cancel: &CancellationToken, entry: &RefEntry) -> Result<RefEntry> {
        cancellable(
            cancel,
            retry_on_lock("create_with_tree", self.settings.max_lock_wait_ms, move || {
                self.create_with_tree_once(entry)
            }),
        )
        .await
    }

    async fn create_with_tree_once(&self, entry: &RefEntry) -> Result<RefEntry> {
        let mut tx = begin_monitored(&self.pool, "writer::create_with_tree").await?;

        let mut result = entry.clone();
        result.created_at = insert_entry_row(&mut tx, entry).await?;
        index_entry(&mut tx, &entry.id, &entry.text_normalized).await?;

        for (sense, out) in entry.senses.iter().zip(result.senses.iter_mut()) {
            out.ref_entry_id = entry.id;
            out.created_at = insert_sense(&mut tx, entry.id, sense).await?;

            for (translation, out_translation) in sense.translations.iter().zip(out.translations.iter_mut()) {
                insert_translation(&mut tx, sense.id, translation).await?;
                out_translation.ref_sense_id = sense.id;
            }
            for (example, out_example) in sense.examples.iter().zip(out.examples.iter_mut()) {
                insert_example(&mut tx, sense.id, example).await?;
                out_example.ref_sense_id = sense.id;
            }
        }

        for (pronunciation, out) in entry.pronunciations.iter().zip(result.pronunciations.iter_mut()) {
            insert_pronunciation(&mut tx, entry.id, pronunciation).await?;
            out.ref_entry_id = entry.id;
            // Absent and empty transcriptions are stored identically
            out.transcription = out.transcription.take().filter(|t| !t.is_empty());
        }

        for (image, out) in entry.images.iter().zip(result.images.iter_mut()) {
            insert_image(&mut tx, entry.id, image).await?;
            out.ref_entry_id = entry.id;
        }

        tx.commit().await?;

        info!(
            entry_id = %entry.id,
            text = %entry.text,
            senses = entry.senses.len(),
            pronunciations = entry.pronunciations.len(),
            images = entry.images.len(),
            "Created ref entry with tree"
        );

        Ok(result)
    }

    /// Ensure a root row exists for `text_normalized` and return it.
    ///
    /// Inserts with conflict-skip, then re-reads by normalized text: the
    /// re-read is authoritative, so concurrent callers all observe the
    /// winning row. The returned entry has empty child collections.
    pub async fn get_or_create(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        text: &str,
        text_normalized: &str,
    ) -> Result<RefEntry> {
        cancellable(
            cancel,
            retry_on_lock("get_or_create", self.settings.max_lock_wait_ms, move || {
                self.get_or_create_once(id, text, text_normalized)
            }),
        )
        .await
    }

    async fn get_or_create_once(&self, id: Uuid, text: &str, text_normalized: &str) -> Result<RefEntry> {
        let mut tx = begin_monitored(&self.pool, "writer::get_or_create").await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO ref_entries (id, text, text_normalized)
            VALUES (?, ?, ?)
            ON CONFLICT (text_normalized) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(text)
        .bind(text_normalized)
        .execute(&mut *tx)
        .await
        .classify("insert", "ref_entry", id)?
        .rows_affected();

        if inserted > 0 {
            index_entry(&mut tx, &id, text_normalized).await?;
        }

        let entry = load_entry_row(&mut tx, &EntryKey::Text(text_normalized.to_string())).await?;
        tx.commit().await?;

        if inserted > 0 {
            info!(entry_id = %entry.id, text = %entry.text, "Registered ref entry");
        } else {
            debug!(entry_id = %entry.id, candidate_id = %id, "Ref entry already registered");
        }

        Ok(entry)
    }
}

/// Insert the root row; returns the stored `created_at`
async fn insert_entry_row(conn: &mut SqliteConnection, entry: &RefEntry) -> Result<chrono::DateTime<chrono::Utc>> {
    let created_at: String = sqlx::query_scalar(
        r#"
        INSERT INTO ref_entries (id, text, text_normalized, frequency_rank, cefr_level, is_core_lexicon)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING created_at
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.text)
    .bind(&entry.text_normalized)
    .bind(entry.frequency_rank)
    .bind(&entry.cefr_level)
    .bind(entry.is_core_lexicon)
    .fetch_one(&mut *conn)
    .await
    .classify("insert", "ref_entry", entry.id)?;

    time::parse_stored("ref_entry", "created_at", &created_at)
}

/// Insert one sense under `entry_id`; returns the stored `created_at`
pub(crate) async fn insert_sense(
    conn: &mut SqliteConnection,
    entry_id: Uuid,
    sense: &RefSense,
) -> Result<chrono::DateTime<chrono::Utc>> {
    let created_at: String = sqlx::query_scalar(
        r#"
        INSERT INTO ref_senses (id, ref_entry_id, definition, part_of_speech, cefr_level, notes, source_slug, position)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING created_at
        "#,
    )
    .bind(sense.id.to_string())
    .bind(entry_id.to_string())
    .bind(&sense.definition)
    .bind(part_of_speech_to_stored(sense.part_of_speech))
    .bind(&sense.cefr_level)
    .bind(&sense.notes)
    .bind(&sense.source_slug)
    .bind(sense.position)
    .fetch_one(&mut *conn)
    .await
    .classify("insert", "ref_sense", sense.id)?;

    time::parse_stored("ref_sense", "created_at", &created_at)
}

pub(crate) async fn insert_translation(
    conn: &mut SqliteConnection,
    sense_id: Uuid,
    translation: &RefTranslation,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO ref_translations (id, ref_sense_id, text, source_slug, position) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(translation.id.to_string())
    .bind(sense_id.to_string())
    .bind(&translation.text)
    .bind(&translation.source_slug)
    .bind(translation.position)
    .execute(&mut *conn)
    .await
    .classify("insert", "ref_translation", translation.id)?;
    Ok(())
}

pub(crate) async fn insert_example(conn: &mut SqliteConnection, sense_id: Uuid, example: &RefExample) -> Result<()> {
    sqlx::query(
        "INSERT INTO ref_examples (id, ref_sense_id, sentence, translation, source_slug, position) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(example.id.to_string())
    .bind(sense_id.to_string())
    .bind(&example.sentence)
    .bind(&example.translation)
    .bind(&example.source_slug)
    .bind(example.position)
    .execute(&mut *conn)
    .await
    .classify("insert", "ref_example", example.id)?;
    Ok(())
}

async fn insert_pronunciation(
    conn: &mut SqliteConnection,
    entry_id: Uuid,
    pronunciation: &RefPronunciation,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO ref_pronunciations (id, ref_entry_id, transcription, audio_url, region, source_slug) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(pronunciation.id.to_string())
    .bind(entry_id.to_string())
    .bind(transcription_to_stored(&pronunciation.transcription))
    .bind(&pronunciation.audio_url)
    .bind(&pronunciation.region)
    .bind(&pronunciation.source_slug)
    .execute(&mut *conn)
    .await
    .classify("insert", "ref_pronunciation", pronunciation.id)?;
    Ok(())
}

async fn insert_image(conn: &mut SqliteConnection, entry_id: Uuid, image: &RefImage) -> Result<()> {
    sqlx::query("INSERT INTO ref_images (id, ref_entry_id, url, caption, source_slug) VALUES (?, ?, ?, ?, ?)")
        .bind(image.id.to_string())
        .bind(entry_id.to_string())
        .bind(&image.url)
        .bind(&image.caption)
        .bind(&image.source_slug)
        .execute(&mut *conn)
        .await
        .classify("insert", "ref_image", image.id)?;
    Ok(())
}
