//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in `schema_version`. Baseline
//! tables are created by [`crate::db::init::create_schema`]; migrations here
//! cover column additions and data backfills for databases created by older
//! builds.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - they must stay stable for databases upgrading from older versions
//! 2. **Always add new migrations** - one migration function per schema change
//! 3. **Check before altering** - every migration must be safe to run twice

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use super::trigram_index::index_entry;
use crate::uuid_utils;

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: add `dataset_version` to ref_data_sources
///
/// Early registries tracked only name and type.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='ref_data_sources')",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(());
    }

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('ref_data_sources') WHERE name = 'dataset_version'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query("ALTER TABLE ref_data_sources ADD COLUMN dataset_version TEXT")
            .execute(pool)
            .await?;
        info!("Migration v1: added dataset_version to ref_data_sources");
    }

    Ok(())
}

/// Migration v2: backfill the trigram index
///
/// Entries written before fuzzy lookup existed have no trigram rows.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let rows = sqlx::query(
        r#"
        SELECT e.id, e.text_normalized
        FROM ref_entries e
        WHERE NOT EXISTS (
            SELECT 1 FROM ref_entry_trigrams t WHERE t.ref_entry_id = e.id
        )
        "#,
    )
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for row in &rows {
        let id: String = row.try_get("id")?;
        let text_normalized: String = row.try_get("text_normalized")?;
        let id = uuid_utils::parse_stored("ref_entry", "id", &id)?;
        index_entry(&mut *tx, &id, &text_normalized).await?;
    }
    tx.commit().await?;

    info!("Migration v2: indexed trigrams for {} entries", rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        // Single connection so every query sees the same in-memory database
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_schema_version_no_table() {
        let pool = setup_test_db().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrate_v1_no_table() {
        let pool = setup_test_db().await;
        // Should succeed even if ref_data_sources doesn't exist
        migrate_v1(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_v1_adds_column_once() {
        let pool = setup_test_db().await;
        sqlx::query(
            r#"
            CREATE TABLE ref_data_sources (
                slug TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                source_type TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        migrate_v1(&pool).await.unwrap();
        migrate_v1(&pool).await.unwrap();

        let column_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('ref_data_sources') WHERE name = 'dataset_version'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(column_count, 1);
    }

    #[tokio::test]
    async fn test_run_migrations_backfills_trigrams() {
        let pool = setup_test_db().await;
        crate::db::init::create_schema(&pool).await.unwrap();

        // Entry written without going through the index
        sqlx::query("INSERT INTO ref_entries (id, text, text_normalized) VALUES (?, 'Apple', 'apple')")
            .bind(uuid_utils::generate().to_string())
            .execute(&pool)
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();

        let indexed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ref_entry_trigrams")
            .fetch_one(&pool)
            .await
            .unwrap();
        // "  a", " ap", "app", "ppl", "ple", "le "
        assert_eq!(indexed, 6);
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

        // Second run is a no-op
        run_migrations(&pool).await.unwrap();
    }
}
