//! Fuzzy Lookup
//!
//! Trigram-ranked search over normalized entry text. The
//! `ref_entry_trigrams` index narrows candidates in SQL to entries whose
//! shared-trigram count can still reach the configured threshold; the
//! survivors are scored and ordered here.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use refcat_common::db::models::RefEntry;
use refcat_common::normalize::normalize_text;
use refcat_common::trigram::{set_similarity, trigrams};
use refcat_common::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::classify::ClassifyExt;
use super::mapper::{EntryRow, ENTRY_COLUMNS};
use super::RefRepository;
use crate::utils::cancellable;

/// Slack on the SQL-side similarity filter; `rank` makes the final call
const SQL_SIMILARITY_SLACK: f64 = 1e-6;

impl RefRepository {
    /// Entries whose normalized text is similar to `query`, best first.
    ///
    /// An empty query or a non-positive limit returns an empty result
    /// without touching storage. Results carry no child collections.
    pub async fn search(&self, cancel: &CancellationToken, query: &str, limit: i64) -> Result<Vec<RefEntry>> {
        let query = normalize_text(query);
        if query.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }
        let query_grams = trigrams(&query);
        if query_grams.is_empty() {
            return Ok(Vec::new());
        }

        cancellable(cancel, async {
            let mut conn = self.acquire("search::search").await?;
            let grams: Vec<String> = query_grams.iter().cloned().collect();
            let threshold = self.settings.search_similarity_threshold;

            let rows = candidate_rows(&mut conn, &grams, threshold, limit).await?;
            let candidates = rows.len();

            let results = rank(&query_grams, rows, threshold, limit as usize)?;

            debug!(
                query = %query,
                candidates,
                hits = results.len(),
                "Fuzzy lookup finished"
            );
            Ok(results)
        })
        .await
    }
}

/// Fewest shared trigrams an entry needs to reach `threshold` against a
/// query of `query_len` trigrams. Jaccard `s / (|Q| + |E| - s)` with
/// `|E| >= s` is at most `s / |Q|`, so `s >= threshold * |Q|`.
fn min_shared_trigrams(threshold: f32, query_len: usize) -> i64 {
    let bound = (f64::from(threshold) * query_len as f64 - SQL_SIMILARITY_SLACK).ceil();
    (bound as i64).max(1)
}

/// Entry rows whose trigram overlap with `grams` can reach `threshold`,
/// best first and capped at `limit`.
///
/// Shared and per-entry trigram counts come from the index, so entries
/// sharing only a stray trigram with the query never leave SQLite. The
/// gram list is bound in one statement; splitting it would split the
/// per-entry counts.
pub(crate) async fn candidate_rows(
    conn: &mut SqliteConnection,
    grams: &[String],
    threshold: f32,
    limit: i64,
) -> Result<Vec<EntryRow>> {
    if grams.is_empty() || limit <= 0 {
        return Ok(Vec::new());
    }
    let query_len = grams.len() as i64;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM ref_entries JOIN (\
         SELECT q.ref_entry_id AS match_id, \
         CAST(COUNT(*) AS REAL) / (",
        ENTRY_COLUMNS
    ));
    builder.push_bind(query_len);
    builder.push(
        " + (SELECT COUNT(*) FROM ref_entry_trigrams e WHERE e.ref_entry_id = q.ref_entry_id) \
         - COUNT(*)) AS similarity \
         FROM ref_entry_trigrams q WHERE q.trigram IN (",
    );
    let mut separated = builder.separated(", ");
    for gram in grams {
        separated.push_bind(gram.as_str());
    }
    separated.push_unseparated(")");
    builder
        .push(" GROUP BY q.ref_entry_id HAVING COUNT(*) >= ")
        .push_bind(min_shared_trigrams(threshold, grams.len()));
    builder
        .push(") m ON m.match_id = ref_entries.id WHERE m.similarity >= ")
        .push_bind(f64::from(threshold) - SQL_SIMILARITY_SLACK);
    builder
        .push(" ORDER BY m.similarity DESC, ref_entries.text_normalized ASC LIMIT ")
        .push_bind(limit);

    builder
        .build_query_as::<EntryRow>()
        .fetch_all(&mut *conn)
        .await
        .classify("search", "ref_entry_trigram", format!("{} trigrams", grams.len()))
}

/// Score, filter and order candidate rows
fn rank(
    query_grams: &BTreeSet<String>,
    rows: Vec<EntryRow>,
    threshold: f32,
    limit: usize,
) -> Result<Vec<RefEntry>> {
    let mut scored: Vec<(f32, EntryRow)> = rows
        .into_iter()
        .map(|row| (set_similarity(query_grams, &trigrams(&row.text_normalized)), row))
        .filter(|(score, _)| *score >= threshold)
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.text_normalized.cmp(&b.text_normalized))
    });
    scored.truncate(limit);

    scored.into_iter().map(|(_, row)| row.into_entry()).collect()
}
