//! Integration tests for position-based content reconciliation

mod helpers;

use helpers::{count_rows, create_test_catalog, example, sample_entry, sense, translation};
use refcat_common::db::models::{CoverageStatus, EntryKey, RefEntry, RefExample, RefSense, RefTranslation};
use refcat_common::ErrorKind;
use refcat_store::{Catalog, ReconcileSummary};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Incoming content as the enrichment worker produces it: fresh ids, with
/// children linked to their incoming sense
struct Incoming {
    senses: Vec<RefSense>,
    translations: Vec<RefTranslation>,
    examples: Vec<RefExample>,
}

fn incoming(entry_id: Uuid, definitions: &[&str], translations_per_sense: usize) -> Incoming {
    let senses: Vec<RefSense> = definitions
        .iter()
        .enumerate()
        .map(|(i, def)| {
            let mut s = sense(entry_id, def, i as i32);
            s.source_slug = "llm".to_string();
            s
        })
        .collect();
    let translations = senses
        .iter()
        .flat_map(|s| {
            (0..translations_per_sense).map(move |i| {
                let text = format!("{} new tr{}", s.definition.as_deref().unwrap_or(""), i);
                let mut t = translation(s.id, &text, i as i32);
                t.source_slug = "llm".to_string();
                t
            })
        })
        .collect();
    let examples = senses
        .iter()
        .map(|s| {
            let sentence = format!("New example for {}", s.definition.as_deref().unwrap_or(""));
            example(s.id, &sentence, 0)
        })
        .collect();
    Incoming {
        senses,
        translations,
        examples,
    }
}

async fn reconcile(
    catalog: &Catalog,
    entry_id: Uuid,
    content: &Incoming,
) -> refcat_common::Result<ReconcileSummary> {
    catalog
        .reconcile_content(
            &CancellationToken::new(),
            entry_id,
            &content.senses,
            &content.translations,
            &content.examples,
        )
        .await
}

async fn tree(catalog: &Catalog, entry_id: Uuid) -> RefEntry {
    catalog
        .get_full_tree(&CancellationToken::new(), EntryKey::Id(entry_id))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_same_length_preserves_identity() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("light");
    let created = tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let content = incoming(entry.id, &["brightness", "not heavy"], 2);
    let summary = reconcile(&tc.catalog, entry.id, &content).await.unwrap();
    assert_eq!(summary.senses_updated, 2);
    assert_eq!(summary.senses_inserted, 0);
    assert_eq!(summary.senses_deleted, 0);

    let after = tree(&tc.catalog, entry.id).await;
    for (i, s) in after.senses.iter().enumerate() {
        // Existing ids survive, content is replaced
        assert_eq!(s.id, entry.senses[i].id);
        assert_eq!(s.definition, content.senses[i].definition);
        assert_eq!(s.source_slug, "llm");
        assert_eq!(s.created_at, created.senses[i].created_at);

        assert_eq!(s.translations.len(), 2);
        for (j, t) in s.translations.iter().enumerate() {
            assert_eq!(t.id, entry.senses[i].translations[j].id);
            assert_eq!(t.ref_sense_id, s.id);
        }
        assert_eq!(s.examples[0].id, entry.senses[i].examples[0].id);
        assert!(s.examples[0].sentence.starts_with("New example"));
    }

    // Pronunciations and images are not touched
    assert_eq!(after.pronunciations, entry.pronunciations);
    assert_eq!(after.images, entry.images);
}

#[tokio::test]
async fn test_growth_appends_new_senses() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("bank");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let content = incoming(entry.id, &["river side", "money house", "tilt", "store"], 1);
    let summary = reconcile(&tc.catalog, entry.id, &content).await.unwrap();
    assert_eq!(summary.senses_updated, 2);
    assert_eq!(summary.senses_inserted, 2);
    assert_eq!(summary.senses_deleted, 0);

    let after = tree(&tc.catalog, entry.id).await;
    assert_eq!(after.senses.len(), 4);
    assert_eq!(after.senses[0].id, entry.senses[0].id);
    assert_eq!(after.senses[1].id, entry.senses[1].id);
    // New senses keep the incoming ids
    assert_eq!(after.senses[2].id, content.senses[2].id);
    assert_eq!(after.senses[3].id, content.senses[3].id);
    assert_eq!(after.senses[3].definition.as_deref(), Some("store"));

    // Each updated sense shrank from two translations to one
    assert_eq!(after.senses[0].translations.len(), 1);
    assert_eq!(after.senses[0].translations[0].id, entry.senses[0].translations[0].id);
    assert_eq!(after.senses[2].translations.len(), 1);
    assert_eq!(after.senses[2].translations[0].id, content.translations[2].id);
    assert_eq!(after.senses[2].translations[0].ref_sense_id, content.senses[2].id);
    assert_eq!(count_rows(tc.pool(), "ref_translations").await, 4);
}

#[tokio::test]
async fn test_shrink_deletes_trailing_senses_and_children() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let mut entry = sample_entry("set");
    entry.senses.push(helpers::sense_with_children(entry.id, "third", 2, 2, 1));
    entry.senses.push(helpers::sense_with_children(entry.id, "fourth", 3, 2, 1));
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();
    assert_eq!(count_rows(tc.pool(), "ref_senses").await, 4);

    let content = incoming(entry.id, &["put", "group"], 2);
    let summary = reconcile(&tc.catalog, entry.id, &content).await.unwrap();
    assert_eq!(summary.senses_updated, 2);
    assert_eq!(summary.senses_deleted, 2);

    let after = tree(&tc.catalog, entry.id).await;
    assert_eq!(after.senses.len(), 2);
    assert_eq!(after.senses[0].id, entry.senses[0].id);
    assert_eq!(after.senses[1].id, entry.senses[1].id);

    // Children of the deleted senses went with them
    assert_eq!(count_rows(tc.pool(), "ref_senses").await, 2);
    assert_eq!(count_rows(tc.pool(), "ref_translations").await, 4);
    assert_eq!(count_rows(tc.pool(), "ref_examples").await, 2);
}

#[tokio::test]
async fn test_child_lists_reconcile_independently() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("fast");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let mut content = incoming(entry.id, &["quick", "abstain"], 0);
    // First sense gets three translations (one more than stored), the
    // second none (two fewer)
    content.translations = (0..3)
        .map(|i| translation(content.senses[0].id, &format!("rápido {}", i), i))
        .collect();
    content.examples.clear();

    let summary = reconcile(&tc.catalog, entry.id, &content).await.unwrap();
    assert_eq!(summary.children_updated, 2);
    assert_eq!(summary.children_inserted, 1);
    // two translations of the second sense plus one example per sense
    assert_eq!(summary.children_deleted, 4);

    let after = tree(&tc.catalog, entry.id).await;
    let first = &after.senses[0];
    assert_eq!(first.translations.len(), 3);
    assert_eq!(first.translations[0].id, entry.senses[0].translations[0].id);
    assert_eq!(first.translations[1].id, entry.senses[0].translations[1].id);
    assert_eq!(first.translations[2].id, content.translations[2].id);
    // Inserted child is attached to the surviving sense, not the incoming one
    assert_eq!(first.translations[2].ref_sense_id, entry.senses[0].id);
    assert!(first.examples.is_empty());

    assert!(after.senses[1].translations.is_empty());
    assert!(after.senses[1].examples.is_empty());
}

#[tokio::test]
async fn test_incoming_order_follows_position() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("spring");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let mut content = incoming(entry.id, &["season", "coil"], 0);
    content.senses.reverse();

    reconcile(&tc.catalog, entry.id, &content).await.unwrap();
    let after = tree(&tc.catalog, entry.id).await;
    assert_eq!(after.senses[0].id, entry.senses[0].id);
    assert_eq!(after.senses[0].definition.as_deref(), Some("season"));
    assert_eq!(after.senses[1].definition.as_deref(), Some("coil"));
}

#[tokio::test]
async fn test_reconcile_marks_enrichment_coverage() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("rock");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();
    tc.catalog
        .mark_coverage(&cancel, entry.id, "llm", CoverageStatus::Failed)
        .await
        .unwrap();

    reconcile(&tc.catalog, entry.id, &incoming(entry.id, &["stone"], 1))
        .await
        .unwrap();

    let coverage = tc.catalog.get_coverage(&cancel, entry.id).await.unwrap();
    assert_eq!(coverage.len(), 1);
    assert_eq!(coverage[0].source_slug, "llm");
    assert_eq!(coverage[0].status, CoverageStatus::Fetched);
}

#[tokio::test]
async fn test_empty_incoming_clears_senses() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("void");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let summary = reconcile(&tc.catalog, entry.id, &incoming(entry.id, &[], 0))
        .await
        .unwrap();
    assert_eq!(summary.senses_deleted, 2);
    assert_eq!(count_rows(tc.pool(), "ref_senses").await, 0);
    assert_eq!(count_rows(tc.pool(), "ref_translations").await, 0);
    assert_eq!(count_rows(tc.pool(), "ref_entry_source_coverage").await, 1);
}

#[tokio::test]
async fn test_missing_entry_is_not_found() {
    let tc = create_test_catalog().await;
    let missing = Uuid::new_v4();

    let err = reconcile(&tc.catalog, missing, &incoming(missing, &["ghost"], 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(count_rows(tc.pool(), "ref_senses").await, 0);
    assert_eq!(count_rows(tc.pool(), "ref_entry_source_coverage").await, 0);
}

#[tokio::test]
async fn test_failure_rolls_back_everything() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("wave");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let mut content = incoming(entry.id, &["greeting", "water", "pattern"], 1);
    // Third sense is inserted after the first two are updated, then fails
    content.senses[2].cefr_level = Some("Z9".to_string());

    let err = reconcile(&tc.catalog, entry.id, &content).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let after = tree(&tc.catalog, entry.id).await;
    assert_eq!(after.senses.len(), 2);
    assert_eq!(after.senses[0].definition, entry.senses[0].definition);
    assert_eq!(after.senses[0].translations, entry.senses[0].translations);
    assert_eq!(count_rows(tc.pool(), "ref_entry_source_coverage").await, 0);
}

#[tokio::test]
async fn test_child_of_unknown_sense_is_rejected() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let entry = sample_entry("kite");
    tc.catalog.create_entry_with_tree(&cancel, &entry).await.unwrap();

    let mut content = incoming(entry.id, &["toy"], 0);
    let stray = translation(Uuid::new_v4(), "cometa", 0);
    content.translations.push(stray.clone());

    let err = reconcile(&tc.catalog, entry.id, &content).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("ref_translation"));
    assert!(err.to_string().contains(&stray.id.to_string()));

    // Nothing was touched
    let after = tree(&tc.catalog, entry.id).await;
    assert_eq!(after.senses.len(), 2);
    assert_eq!(after.senses[0].translations, entry.senses[0].translations);
    assert_eq!(count_rows(tc.pool(), "ref_translations").await, 4);
    assert_eq!(count_rows(tc.pool(), "ref_entry_source_coverage").await, 0);

    let mut content = incoming(entry.id, &["toy"], 0);
    let stray = example(Uuid::new_v4(), "The kite flew.", 0);
    content.examples.push(stray.clone());

    let err = reconcile(&tc.catalog, entry.id, &content).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("ref_example"));
    assert!(err.to_string().contains(&stray.id.to_string()));
    assert_eq!(count_rows(tc.pool(), "ref_examples").await, 2);
}
