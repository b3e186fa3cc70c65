//! Reference catalog repository
//!
//! [`RefRepository`] owns the shared pool plus the tunables the storage
//! paths need. Its operations are split by concern across the submodules:
//! reader, writer, bulk, reconcile, search and registry.

pub mod bulk;
pub mod classify;
pub mod mapper;
pub mod reader;
pub mod reconcile;
pub mod registry;
pub mod search;
pub mod writer;

use refcat_common::config::CatalogConfig;
use refcat_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use classify::ClassifyExt;

/// Storage tunables taken from [`CatalogConfig`]
#[derive(Debug, Clone)]
pub struct RepoSettings {
    pub bulk_chunk_size: usize,
    pub max_lock_wait_ms: u64,
    pub search_similarity_threshold: f32,
    pub enrichment_source_slug: String,
}

impl From<&CatalogConfig> for RepoSettings {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            bulk_chunk_size: config.bulk_chunk_size.max(1),
            max_lock_wait_ms: config.max_lock_wait_ms,
            search_similarity_threshold: config.search_similarity_threshold,
            enrichment_source_slug: config.enrichment_source_slug.clone(),
        }
    }
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self::from(&CatalogConfig::default())
    }
}

/// Repository over the catalog tables
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct RefRepository {
    pool: SqlitePool,
    settings: RepoSettings,
}

impl RefRepository {
    pub fn new(pool: SqlitePool, settings: RepoSettings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    async fn acquire(&self, caller: &'static str) -> Result<sqlx::pool::PoolConnection<Sqlite>> {
        self.pool.acquire().await.classify("acquire", "connection", caller)
    }
}

/// Fetch rows whose `column` is in `keys`, one `IN (...)` statement per chunk.
///
/// `select` is everything before the `WHERE`; `order_by` is applied per
/// chunk, so callers needing a global order across chunks must sort again.
/// Empty `keys` returns without querying.
pub(crate) async fn fetch_in_chunks<R>(
    conn: &mut SqliteConnection,
    select: &str,
    column: &str,
    keys: &[String],
    order_by: &str,
    chunk_size: usize,
    entity: &'static str,
) -> Result<Vec<R>>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::with_capacity(keys.len());
    for chunk in keys.chunks(chunk_size.max(1)) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(select);
        builder.push(" WHERE ").push(column).push(" IN (");
        let mut separated = builder.separated(", ");
        for key in chunk {
            separated.push_bind(key.as_str());
        }
        separated.push_unseparated(")");
        if !order_by.is_empty() {
            builder.push(" ORDER BY ").push(order_by);
        }

        let mut fetched = builder
            .build_query_as::<R>()
            .fetch_all(&mut *conn)
            .await
            .classify("batch_get", entity, format!("{} keys", chunk.len()))?;
        rows.append(&mut fetched);
    }
    Ok(rows)
}

/// Stored text form of a set of ids
pub(crate) fn id_strings(ids: &[uuid::Uuid]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}
