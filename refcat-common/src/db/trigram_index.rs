//! Maintenance of the `ref_entry_trigrams` index
//!
//! Every code path that inserts a `ref_entries` row calls [`index_entry`] on
//! the same connection (normally inside the same transaction) so that fuzzy
//! lookup never sees an entry without its trigrams.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::trigram::trigrams;
use crate::Result;

/// Write the trigram rows for one entry. Existing rows are left untouched.
pub async fn index_entry(
    conn: &mut SqliteConnection,
    entry_id: &Uuid,
    text_normalized: &str,
) -> Result<u64> {
    let grams = trigrams(text_normalized);
    if grams.is_empty() {
        return Ok(0);
    }

    let entry_id = entry_id.to_string();
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT OR IGNORE INTO ref_entry_trigrams (trigram, ref_entry_id) ");
    builder.push_values(grams.iter(), |mut row, gram| {
        row.push_bind(gram.as_str()).push_bind(entry_id.as_str());
    });

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
