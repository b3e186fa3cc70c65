//! Source registry, relations and coverage reads

use std::collections::HashMap;

use refcat_common::db::models::{
    CoverageStatus, RefDataSource, RefEntrySourceCoverage, RefWordRelation,
};
use refcat_common::{time, Result};
use sqlx::{QueryBuilder, Sqlite};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::classify::ClassifyExt;
use super::mapper::{
    CoverageRow, DataSourceRow, RelationRow, COVERAGE_COLUMNS, DATA_SOURCE_COLUMNS, RELATION_COLUMNS,
};
use super::{fetch_in_chunks, id_strings, RefRepository};
use crate::utils::{begin_monitored, cancellable, retry_on_lock};

impl RefRepository {
    /// Insert or update registry records by slug.
    ///
    /// An existing slug takes the new name, description, type, active flag
    /// and dataset version; its `created_at` is kept.
    pub async fn upsert_data_sources(&self, cancel: &CancellationToken, sources: &[RefDataSource]) -> Result<()> {
        if sources.is_empty() {
            return Ok(());
        }
        cancellable(
            cancel,
            retry_on_lock("upsert_data_sources", self.settings.max_lock_wait_ms, move || async move {
                let mut tx = begin_monitored(&self.pool, "registry::upsert_data_sources").await?;
                let now = time::to_stored(&time::now());

                for chunk in sources.chunks(self.settings.bulk_chunk_size) {
                    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                        "INSERT INTO ref_data_sources (slug, name, description, source_type, is_active, dataset_version, created_at, updated_at) ",
                    );
                    builder.push_values(chunk, |mut row, source| {
                        row.push_bind(source.slug.as_str())
                            .push_bind(source.name.as_str())
                            .push_bind(source.description.as_deref())
                            .push_bind(source.source_type.as_str())
                            .push_bind(source.is_active)
                            .push_bind(source.dataset_version.as_deref())
                            .push_bind(now.as_str())
                            .push_bind(now.as_str());
                    });
                    builder.push(
                        r#"
                        ON CONFLICT (slug) DO UPDATE SET
                            name = excluded.name,
                            description = excluded.description,
                            source_type = excluded.source_type,
                            is_active = excluded.is_active,
                            dataset_version = excluded.dataset_version,
                            updated_at = excluded.updated_at
                        "#,
                    );

                    builder
                        .build()
                        .execute(&mut *tx)
                        .await
                        .classify("upsert", "ref_data_source", format!("{} rows", chunk.len()))?;
                }

                tx.commit().await?;
                Ok(())
            }),
        )
        .await?;

        info!(count = sources.len(), "Upserted data sources");
        Ok(())
    }

    /// Every registered source, ordered by slug
    pub async fn get_all_data_sources(&self, cancel: &CancellationToken) -> Result<Vec<RefDataSource>> {
        cancellable(cancel, async {
            let rows: Vec<DataSourceRow> = sqlx::query_as(&format!(
                "SELECT {} FROM ref_data_sources ORDER BY slug",
                DATA_SOURCE_COLUMNS
            ))
            .fetch_all(&self.pool)
            .await
            .classify("list", "ref_data_source", "all")?;
            rows.into_iter().map(DataSourceRow::into_data_source).collect()
        })
        .await
    }

    pub async fn get_data_source_by_slug(&self, cancel: &CancellationToken, slug: &str) -> Result<RefDataSource> {
        cancellable(cancel, async {
            let row: DataSourceRow = sqlx::query_as(&format!(
                "SELECT {} FROM ref_data_sources WHERE slug = ?",
                DATA_SOURCE_COLUMNS
            ))
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .classify("get", "ref_data_source", slug)?;
            row.into_data_source()
        })
        .await
    }

    /// Relations where the entry is either end, oldest first
    pub async fn get_relations(&self, cancel: &CancellationToken, entry_id: Uuid) -> Result<Vec<RefWordRelation>> {
        cancellable(cancel, async {
            let id = entry_id.to_string();
            let rows: Vec<RelationRow> = sqlx::query_as(&format!(
                "SELECT {} FROM ref_word_relations WHERE source_entry_id = ? OR target_entry_id = ? ORDER BY created_at, id",
                RELATION_COLUMNS
            ))
            .bind(&id)
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .classify("list", "ref_word_relation", entry_id)?;
            rows.into_iter().map(RelationRow::into_relation).collect()
        })
        .await
    }

    /// Coverage records of one entry, ordered by source slug
    pub async fn get_coverage(
        &self,
        cancel: &CancellationToken,
        entry_id: Uuid,
    ) -> Result<Vec<RefEntrySourceCoverage>> {
        cancellable(cancel, async {
            let rows: Vec<CoverageRow> = sqlx::query_as(&format!(
                "SELECT {} FROM ref_entry_source_coverage WHERE ref_entry_id = ? ORDER BY source_slug",
                COVERAGE_COLUMNS
            ))
            .bind(entry_id.to_string())
            .fetch_all(&self.pool)
            .await
            .classify("list", "coverage", entry_id)?;
            rows.into_iter().map(CoverageRow::into_coverage).collect()
        })
        .await
    }

    /// Coverage records for many entries, keyed by entry id.
    ///
    /// Entries without coverage are absent from the map.
    pub async fn get_coverage_batch(
        &self,
        cancel: &CancellationToken,
        entry_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<RefEntrySourceCoverage>>> {
        if entry_ids.is_empty() {
            return Ok(HashMap::new());
        }
        cancellable(cancel, async {
            let mut conn = self.acquire("registry::coverage_batch").await?;
            let rows: Vec<CoverageRow> = fetch_in_chunks(
                &mut conn,
                &format!("SELECT {} FROM ref_entry_source_coverage", COVERAGE_COLUMNS),
                "ref_entry_id",
                &id_strings(entry_ids),
                "ref_entry_id, source_slug",
                self.settings.bulk_chunk_size,
                "coverage",
            )
            .await?;

            let mut by_entry: HashMap<Uuid, Vec<RefEntrySourceCoverage>> = HashMap::new();
            for row in rows {
                let record = row.into_coverage()?;
                by_entry.entry(record.ref_entry_id).or_default().push(record);
            }
            Ok(by_entry)
        })
        .await
    }

    /// Record the outcome of one source for one entry (fetched now)
    pub async fn mark_coverage(
        &self,
        cancel: &CancellationToken,
        entry_id: Uuid,
        source_slug: &str,
        status: CoverageStatus,
        dataset_version: Option<String>,
    ) -> Result<()> {
        let record = RefEntrySourceCoverage {
            ref_entry_id: entry_id,
            source_slug: source_slug.to_string(),
            status,
            dataset_version,
            fetched_at: time::now(),
        };
        self.bulk_insert_coverage(cancel, std::slice::from_ref(&record)).await?;
        Ok(())
    }
}
