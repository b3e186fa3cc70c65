//! Reconciliation Engine
//!
//! Replaces the senses of one entry (and their translations and examples)
//! with a newly generated set while keeping existing ids wherever a position
//! still exists. Matching is by position index only: existing rows ordered
//! by `position` pair up with incoming rows ordered the same way. Paired
//! rows are updated in place, surplus incoming rows are inserted and surplus
//! existing rows are deleted (senses cascade to their children).

use std::collections::{HashMap, HashSet};

use refcat_common::db::models::{CoverageStatus, RefExample, RefSense, RefTranslation};
use refcat_common::{time, uuid_utils, Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::classify::ClassifyExt;
use super::mapper::part_of_speech_to_stored;
use super::writer::{insert_example, insert_sense, insert_translation};
use super::RefRepository;
use crate::utils::{begin_monitored, cancellable, retry_on_lock};

/// How one level of a positional merge splits up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionalPlan {
    /// Leading pairs updated in place
    pub update: usize,
    /// Incoming rows past the shared prefix
    pub insert: usize,
    /// Existing rows past the shared prefix
    pub delete: usize,
}

impl PositionalPlan {
    pub fn new(existing: usize, incoming: usize) -> Self {
        let shared = existing.min(incoming);
        Self {
            update: shared,
            insert: incoming - shared,
            delete: existing - shared,
        }
    }
}

/// Row counts touched by one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub senses_updated: usize,
    pub senses_inserted: usize,
    pub senses_deleted: usize,
    pub children_updated: usize,
    pub children_inserted: usize,
    pub children_deleted: usize,
}

impl RefRepository {
    /// Reconcile an entry's senses with `new_senses`.
    ///
    /// `new_translations` and `new_examples` are attached to the incoming
    /// sense whose id they carry in `ref_sense_id`. Runs in one transaction
    /// and finishes by marking the configured enrichment source as fetched.
    /// Returns `NotFound` if the entry does not exist, and `Validation` if a
    /// translation or example names a sense that is not among `new_senses`.
    pub async fn reconcile_content(
        &self,
        cancel: &CancellationToken,
        entry_id: Uuid,
        new_senses: &[RefSense],
        new_translations: &[RefTranslation],
        new_examples: &[RefExample],
    ) -> Result<ReconcileSummary> {
        check_child_parents(new_senses, new_translations, new_examples)?;
        cancellable(
            cancel,
            retry_on_lock("reconcile_content", self.settings.max_lock_wait_ms, move || {
                self.reconcile_once(entry_id, new_senses, new_translations, new_examples)
            }),
        )
        .await
    }

    async fn reconcile_once(
        &self,
        entry_id: Uuid,
        new_senses: &[RefSense],
        new_translations: &[RefTranslation],
        new_examples: &[RefExample],
    ) -> Result<ReconcileSummary> {
        let mut tx = begin_monitored(&self.pool, "reconcile::reconcile_content").await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM ref_entries WHERE id = ?")
            .bind(entry_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .classify("get", "ref_entry", entry_id)?;
        if exists.is_none() {
            return Err(Error::not_found("ref_entry", entry_id));
        }

        let existing = existing_child_ids(&mut tx, "ref_senses", "ref_entry_id", entry_id).await?;

        let mut senses: Vec<&RefSense> = new_senses.iter().collect();
        senses.sort_by_key(|s| s.position);

        let mut translations_by_sense: HashMap<Uuid, Vec<&RefTranslation>> = HashMap::new();
        for translation in new_translations {
            translations_by_sense
                .entry(translation.ref_sense_id)
                .or_default()
                .push(translation);
        }
        let mut examples_by_sense: HashMap<Uuid, Vec<&RefExample>> = HashMap::new();
        for example in new_examples {
            examples_by_sense
                .entry(example.ref_sense_id)
                .or_default()
                .push(example);
        }

        let plan = PositionalPlan::new(existing.len(), senses.len());
        let mut summary = ReconcileSummary::default();

        for (existing_id, sense) in existing.iter().zip(&senses) {
            update_sense(&mut tx, *existing_id, sense).await?;
            summary.senses_updated += 1;

            let translations = translations_by_sense.remove(&sense.id).unwrap_or_default();
            reconcile_translations(&mut tx, *existing_id, translations, &mut summary).await?;
            let examples = examples_by_sense.remove(&sense.id).unwrap_or_default();
            reconcile_examples(&mut tx, *existing_id, examples, &mut summary).await?;
        }

        for sense in senses.iter().skip(plan.update) {
            insert_sense(&mut tx, entry_id, sense).await?;
            summary.senses_inserted += 1;

            let mut translations = translations_by_sense.remove(&sense.id).unwrap_or_default();
            translations.sort_by_key(|t| t.position);
            for translation in translations {
                insert_translation(&mut tx, sense.id, translation).await?;
                summary.children_inserted += 1;
            }
            let mut examples = examples_by_sense.remove(&sense.id).unwrap_or_default();
            examples.sort_by_key(|e| e.position);
            for example in examples {
                insert_example(&mut tx, sense.id, example).await?;
                summary.children_inserted += 1;
            }
        }

        summary.senses_deleted = delete_ids(&mut tx, "ref_senses", &existing[plan.update..]).await?;

        sqlx::query(
            r#"
            INSERT INTO ref_entry_source_coverage (ref_entry_id, source_slug, status, fetched_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (ref_entry_id, source_slug) DO UPDATE
            SET status = excluded.status, fetched_at = excluded.fetched_at
            "#,
        )
        .bind(entry_id.to_string())
        .bind(self.settings.enrichment_source_slug.as_str())
        .bind(CoverageStatus::Fetched.as_str())
        .bind(time::to_stored(&time::now()))
        .execute(&mut *tx)
        .await
        .classify("upsert", "coverage", entry_id)?;

        tx.commit().await?;

        info!(
            entry_id = %entry_id,
            senses_updated = summary.senses_updated,
            senses_inserted = summary.senses_inserted,
            senses_deleted = summary.senses_deleted,
            children_updated = summary.children_updated,
            children_inserted = summary.children_inserted,
            children_deleted = summary.children_deleted,
            "Reconciled ref entry content"
        );

        Ok(summary)
    }
}

/// Every incoming child must hang off one of the incoming senses
fn check_child_parents(
    senses: &[RefSense],
    translations: &[RefTranslation],
    examples: &[RefExample],
) -> Result<()> {
    let sense_ids: HashSet<Uuid> = senses.iter().map(|s| s.id).collect();
    if let Some(orphan) = translations.iter().find(|t| !sense_ids.contains(&t.ref_sense_id)) {
        return Err(Error::validation(
            "ref_translation",
            orphan.id,
            format!("ref_sense_id {} is not one of the incoming senses", orphan.ref_sense_id),
        ));
    }
    if let Some(orphan) = examples.iter().find(|e| !sense_ids.contains(&e.ref_sense_id)) {
        return Err(Error::validation(
            "ref_example",
            orphan.id,
            format!("ref_sense_id {} is not one of the incoming senses", orphan.ref_sense_id),
        ));
    }
    Ok(())
}

/// Child ids under `parent_id`, in position order
async fn existing_child_ids(
    conn: &mut SqliteConnection,
    table: &'static str,
    parent_column: &'static str,
    parent_id: Uuid,
) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT id FROM {} WHERE {} = ? ORDER BY position, id",
        table, parent_column
    ))
    .bind(parent_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .classify("list", table, parent_id)?;

    ids.iter()
        .map(|id| uuid_utils::parse_stored(table, "id", id))
        .collect()
}

async fn delete_ids(conn: &mut SqliteConnection, table: &'static str, ids: &[Uuid]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!("DELETE FROM {} WHERE id IN (", table));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let deleted = builder
        .build()
        .execute(&mut *conn)
        .await
        .classify("delete", table, format!("{} ids", ids.len()))?
        .rows_affected();
    Ok(deleted as usize)
}

async fn update_sense(conn: &mut SqliteConnection, existing_id: Uuid, sense: &RefSense) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE ref_senses
        SET definition = ?, part_of_speech = ?, cefr_level = ?, notes = ?, source_slug = ?, position = ?
        WHERE id = ?
        "#,
    )
    .bind(&sense.definition)
    .bind(part_of_speech_to_stored(sense.part_of_speech))
    .bind(&sense.cefr_level)
    .bind(&sense.notes)
    .bind(&sense.source_slug)
    .bind(sense.position)
    .bind(existing_id.to_string())
    .execute(&mut *conn)
    .await
    .classify("update", "ref_sense", existing_id)?;
    Ok(())
}

async fn reconcile_translations(
    conn: &mut SqliteConnection,
    sense_id: Uuid,
    mut incoming: Vec<&RefTranslation>,
    summary: &mut ReconcileSummary,
) -> Result<()> {
    incoming.sort_by_key(|t| t.position);
    let existing = existing_child_ids(conn, "ref_translations", "ref_sense_id", sense_id).await?;
    let plan = PositionalPlan::new(existing.len(), incoming.len());

    for (existing_id, translation) in existing.iter().zip(&incoming) {
        sqlx::query("UPDATE ref_translations SET text = ?, source_slug = ?, position = ? WHERE id = ?")
            .bind(&translation.text)
            .bind(&translation.source_slug)
            .bind(translation.position)
            .bind(existing_id.to_string())
            .execute(&mut *conn)
            .await
            .classify("update", "ref_translation", existing_id)?;
    }
    for translation in incoming.iter().skip(plan.update) {
        insert_translation(conn, sense_id, translation).await?;
    }
    let deleted = delete_ids(conn, "ref_translations", &existing[plan.update..]).await?;

    summary.children_updated += plan.update;
    summary.children_inserted += plan.insert;
    summary.children_deleted += deleted;
    Ok(())
}

async fn reconcile_examples(
    conn: &mut SqliteConnection,
    sense_id: Uuid,
    mut incoming: Vec<&RefExample>,
    summary: &mut ReconcileSummary,
) -> Result<()> {
    incoming.sort_by_key(|e| e.position);
    let existing = existing_child_ids(conn, "ref_examples", "ref_sense_id", sense_id).await?;
    let plan = PositionalPlan::new(existing.len(), incoming.len());

    for (existing_id, example) in existing.iter().zip(&incoming) {
        sqlx::query(
            "UPDATE ref_examples SET sentence = ?, translation = ?, source_slug = ?, position = ? WHERE id = ?",
        )
        .bind(&example.sentence)
        .bind(&example.translation)
        .bind(&example.source_slug)
        .bind(example.position)
        .bind(existing_id.to_string())
        .execute(&mut *conn)
        .await
        .classify("update", "ref_example", existing_id)?;
    }
    for example in incoming.iter().skip(plan.update) {
        insert_example(conn, sense_id, example).await?;
    }
    let deleted = delete_ids(conn, "ref_examples", &existing[plan.update..]).await?;

    summary.children_updated += plan.update;
    summary.children_inserted += plan.insert;
    summary.children_deleted += deleted;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_same_length_updates_everything() {
        assert_eq!(
            PositionalPlan::new(3, 3),
            PositionalPlan {
                update: 3,
                insert: 0,
                delete: 0
            }
        );
    }

    #[test]
    fn test_plan_growth() {
        assert_eq!(
            PositionalPlan::new(2, 4),
            PositionalPlan {
                update: 2,
                insert: 2,
                delete: 0
            }
        );
    }

    #[test]
    fn test_plan_shrink() {
        assert_eq!(
            PositionalPlan::new(4, 2),
            PositionalPlan {
                update: 2,
                insert: 0,
                delete: 2
            }
        );
    }

    #[test]
    fn test_plan_from_or_to_empty() {
        assert_eq!(PositionalPlan::new(0, 5).insert, 5);
        assert_eq!(PositionalPlan::new(5, 0).delete, 5);
        assert_eq!(PositionalPlan::new(0, 0), PositionalPlan { update: 0, insert: 0, delete: 0 });
    }

    #[test]
    fn test_children_must_reference_incoming_senses() {
        let entry_id = Uuid::new_v4();
        let sense = RefSense::new(Uuid::new_v4(), entry_id, "llm", 0);
        let ok = RefTranslation {
            id: Uuid::new_v4(),
            ref_sense_id: sense.id,
            text: "ok".to_string(),
            source_slug: "llm".to_string(),
            position: 0,
        };
        assert!(check_child_parents(std::slice::from_ref(&sense), std::slice::from_ref(&ok), &[]).is_ok());

        let orphan = RefTranslation {
            ref_sense_id: Uuid::new_v4(),
            ..ok.clone()
        };
        let err = check_child_parents(std::slice::from_ref(&sense), &[ok, orphan], &[]).unwrap_err();
        assert_eq!(err.kind(), refcat_common::ErrorKind::Validation);
    }
}
