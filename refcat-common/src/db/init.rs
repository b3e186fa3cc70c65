//! Database initialization
//!
//! Opens (or creates) the catalog database, applies connection pragmas and
//! creates the schema. Every step is idempotent, so opening an existing
//! database runs the same sequence.

use crate::config::CatalogConfig;
use crate::time::SQL_NOW;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(config: &CatalogConfig) -> Result<SqlitePool> {
    let db_path = &config.database_path;
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas are per connection, so they go on the connect options rather
    // than a one-off query against the pool.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    // Versioned data migrations run after the baseline tables exist
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create all catalog tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_ref_entries_table(pool).await?;
    create_ref_entry_trigrams_table(pool).await?;
    create_ref_senses_table(pool).await?;
    create_ref_translations_table(pool).await?;
    create_ref_examples_table(pool).await?;
    create_ref_pronunciations_table(pool).await?;
    create_ref_images_table(pool).await?;

    // Metadata tables
    create_ref_word_relations_table(pool).await?;
    create_ref_entry_source_coverage_table(pool).await?;
    create_ref_data_sources_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the ref_entries table
///
/// `text_normalized` carries the catalog-wide uniqueness constraint.
pub async fn create_ref_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS ref_entries (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            text_normalized TEXT NOT NULL UNIQUE,
            frequency_rank INTEGER CHECK (frequency_rank IS NULL OR frequency_rank >= 0),
            cefr_level TEXT CHECK (cefr_level IS NULL OR cefr_level IN ('A1','A2','B1','B2','C1','C2')),
            is_core_lexicon INTEGER DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT ({now})
        )
        "#,
        now = SQL_NOW
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the trigram index backing fuzzy lookup on normalized text
pub async fn create_ref_entry_trigrams_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ref_entry_trigrams (
            trigram TEXT NOT NULL,
            ref_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            PRIMARY KEY (trigram, ref_entry_id)
        ) WITHOUT ROWID
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ref_entry_trigrams_entry ON ref_entry_trigrams(ref_entry_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ref_senses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS ref_senses (
            id TEXT PRIMARY KEY,
            ref_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            definition TEXT,
            part_of_speech TEXT CHECK (part_of_speech IS NULL OR part_of_speech IN (
                'NOUN','VERB','ADJECTIVE','ADVERB','PRONOUN','PREPOSITION',
                'CONJUNCTION','INTERJECTION','PHRASE','IDIOM','OTHER'
            )),
            cefr_level TEXT CHECK (cefr_level IS NULL OR cefr_level IN ('A1','A2','B1','B2','C1','C2')),
            notes TEXT,
            source_slug TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            created_at TEXT NOT NULL DEFAULT ({now})
        )
        "#,
        now = SQL_NOW
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ref_senses_entry ON ref_senses(ref_entry_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ref_translations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ref_translations (
            id TEXT PRIMARY KEY,
            ref_sense_id TEXT NOT NULL REFERENCES ref_senses(id) ON DELETE CASCADE,
            text TEXT NOT NULL,
            source_slug TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ref_translations_sense ON ref_translations(ref_sense_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ref_examples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ref_examples (
            id TEXT PRIMARY KEY,
            ref_sense_id TEXT NOT NULL REFERENCES ref_senses(id) ON DELETE CASCADE,
            sentence TEXT NOT NULL,
            translation TEXT,
            source_slug TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ref_examples_sense ON ref_examples(ref_sense_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the ref_pronunciations table
///
/// `transcription` is never NULL; an absent transcription is stored as ''.
async fn create_ref_pronunciations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ref_pronunciations (
            id TEXT PRIMARY KEY,
            ref_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            transcription TEXT NOT NULL DEFAULT '',
            audio_url TEXT,
            region TEXT,
            source_slug TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ref_pronunciations_entry ON ref_pronunciations(ref_entry_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ref_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ref_images (
            id TEXT PRIMARY KEY,
            ref_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            caption TEXT,
            source_slug TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ref_images_entry ON ref_images(ref_entry_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_ref_word_relations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS ref_word_relations (
            id TEXT PRIMARY KEY,
            source_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            target_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            relation_type TEXT NOT NULL,
            source_slug TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT ({now}),
            CONSTRAINT uq_ref_word_relations UNIQUE (source_entry_id, target_entry_id, relation_type),
            CHECK (source_entry_id <> target_entry_id)
        )
        "#,
        now = SQL_NOW
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ref_word_relations_target ON ref_word_relations(target_entry_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ref_entry_source_coverage_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS ref_entry_source_coverage (
            ref_entry_id TEXT NOT NULL REFERENCES ref_entries(id) ON DELETE CASCADE,
            source_slug TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending','fetched','failed')),
            dataset_version TEXT,
            fetched_at TEXT NOT NULL DEFAULT ({now}),
            PRIMARY KEY (ref_entry_id, source_slug)
        )
        "#,
        now = SQL_NOW
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the ref_data_sources registry
///
/// Slugs stored elsewhere reference this table logically only; there is no
/// foreign key so ingestion order stays free.
async fn create_ref_data_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS ref_data_sources (
            slug TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            source_type TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            dataset_version TEXT,
            created_at TEXT NOT NULL DEFAULT ({now}),
            updated_at TEXT NOT NULL DEFAULT ({now})
        )
        "#,
        now = SQL_NOW
    ))
    .execute(pool)
    .await?;

    Ok(())
}
