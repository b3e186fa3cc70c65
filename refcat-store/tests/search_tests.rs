//! Integration tests for fuzzy lookup over normalized text

mod helpers;

use helpers::{create_test_catalog, create_test_catalog_with};
use refcat_common::db::models::RefEntry;
use refcat_common::normalize_text;
use refcat_store::Catalog;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn seed(catalog: &Catalog, words: &[&str]) -> Vec<RefEntry> {
    let entries: Vec<RefEntry> = words
        .iter()
        .map(|w| RefEntry::new(Uuid::new_v4(), *w, normalize_text(w)))
        .collect();
    catalog
        .register_entries(&CancellationToken::new(), &entries)
        .await
        .unwrap();
    entries
}

fn texts(results: &[RefEntry]) -> Vec<&str> {
    results.iter().map(|e| e.text_normalized.as_str()).collect()
}

#[tokio::test]
async fn test_exact_match_ranks_first() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["apple", "applesauce", "maple", "banana"]).await;

    let results = tc.catalog.search(&cancel, "apple", 10).await.unwrap();
    assert_eq!(results[0].text_normalized, "apple");
    assert!(!texts(&results).contains(&"banana"));
    assert!(results.iter().all(|e| e.senses.is_empty()));
}

#[tokio::test]
async fn test_typo_still_matches() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["apple", "orange"]).await;

    let results = tc.catalog.search(&cancel, "aple", 10).await.unwrap();
    assert_eq!(texts(&results), vec!["apple"]);
}

#[tokio::test]
async fn test_query_is_normalized() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["Café", "tea"]).await;

    let results = tc.catalog.search(&cancel, "  CAFE ", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Café");
}

#[tokio::test]
async fn test_limit_truncates_ranked_results() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["play", "plays", "played", "player", "playing"]).await;

    let results = tc.catalog.search(&cancel, "play", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text_normalized, "play");
}

#[tokio::test]
async fn test_equal_similarity_orders_by_text() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["cad", "cab"]).await;

    let results = tc.catalog.search(&cancel, "ca", 10).await.unwrap();
    assert_eq!(texts(&results), vec!["cab", "cad"]);
}

#[tokio::test]
async fn test_threshold_excludes_weak_matches() {
    let tc = create_test_catalog_with(|config| config.search_similarity_threshold = 0.9).await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["apple"]).await;

    assert!(tc.catalog.search(&cancel, "aple", 10).await.unwrap().is_empty());
    assert_eq!(tc.catalog.search(&cancel, "apple", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_match_is_empty() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    seed(&tc.catalog, &["apple"]).await;

    assert!(tc.catalog.search(&cancel, "zebra", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_query_or_limit_never_touches_storage() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    tc.pool().close().await;

    assert!(tc.catalog.search(&cancel, "", 10).await.unwrap().is_empty());
    assert!(tc.catalog.search(&cancel, "   ", 10).await.unwrap().is_empty());
    assert!(tc.catalog.search(&cancel, "apple", 0).await.unwrap().is_empty());
    assert!(tc.catalog.search(&cancel, "apple", -5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_entries_sharing_one_trigram_do_not_crowd_out_matches() {
    let tc = create_test_catalog().await;
    let cancel = CancellationToken::new();
    let noise: Vec<String> = (0..300).map(|i| format!("h{:04}qqzz", i)).collect();
    let mut words: Vec<&str> = noise.iter().map(String::as_str).collect();
    words.extend(["help", "helps", "hello"]);
    seed(&tc.catalog, &words).await;

    let results = tc.catalog.search(&cancel, "help", 2).await.unwrap();
    assert_eq!(texts(&results), vec!["help", "helps"]);
}
