//! Test Helper Utilities
//!
//! Shared setup for refcat-store integration tests: a file-backed catalog
//! in a temporary directory plus builders for sample aggregates.

#![allow(dead_code)]

use refcat_common::config::CatalogConfig;
use refcat_common::db::models::{
    PartOfSpeech, RefEntry, RefExample, RefImage, RefPronunciation, RefSense, RefTranslation,
};
use refcat_common::normalize_text;
use refcat_store::Catalog;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

/// Catalog backed by a fresh database file; dropping it removes the file
pub struct TestCatalog {
    pub catalog: Catalog,
    pub config: CatalogConfig,
    _dir: TempDir,
}

impl TestCatalog {
    pub fn pool(&self) -> &SqlitePool {
        self.catalog.repository().pool()
    }
}

pub fn test_config(dir: &TempDir) -> CatalogConfig {
    CatalogConfig {
        database_path: dir.path().join("catalog.db"),
        max_connections: 8,
        min_connections: 1,
        ..Default::default()
    }
}

pub async fn create_test_catalog() -> TestCatalog {
    create_test_catalog_with(|_| {}).await
}

/// Same as [`create_test_catalog`] with config tweaks applied first
pub async fn create_test_catalog_with(tweak: impl FnOnce(&mut CatalogConfig)) -> TestCatalog {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(&dir);
    tweak(&mut config);
    let catalog = Catalog::open(&config)
        .await
        .expect("Failed to open test catalog");
    TestCatalog {
        catalog,
        config,
        _dir: dir,
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query failed")
}

pub fn translation(sense_id: Uuid, text: &str, position: i32) -> RefTranslation {
    RefTranslation {
        id: Uuid::new_v4(),
        ref_sense_id: sense_id,
        text: text.to_string(),
        source_slug: "wiktionary".to_string(),
        position,
    }
}

pub fn example(sense_id: Uuid, sentence: &str, position: i32) -> RefExample {
    RefExample {
        id: Uuid::new_v4(),
        ref_sense_id: sense_id,
        sentence: sentence.to_string(),
        translation: None,
        source_slug: "tatoeba".to_string(),
        position,
    }
}

pub fn sense(entry_id: Uuid, definition: &str, position: i32) -> RefSense {
    RefSense {
        definition: Some(definition.to_string()),
        part_of_speech: Some(PartOfSpeech::Noun),
        ..RefSense::new(Uuid::new_v4(), entry_id, "wiktionary", position)
    }
}

/// Sense with `translations` translations and `examples` examples
pub fn sense_with_children(
    entry_id: Uuid,
    definition: &str,
    position: i32,
    translations: usize,
    examples: usize,
) -> RefSense {
    let mut s = sense(entry_id, definition, position);
    s.translations = (0..translations)
        .map(|i| translation(s.id, &format!("{} tr{}", definition, i), i as i32))
        .collect();
    s.examples = (0..examples)
        .map(|i| example(s.id, &format!("{} example {}", definition, i), i as i32))
        .collect();
    s
}

/// Entry with two senses (two translations and one example each), one
/// pronunciation and one image
pub fn sample_entry(text: &str) -> RefEntry {
    let id = Uuid::new_v4();
    let mut entry = RefEntry::new(id, text, normalize_text(text));
    entry.frequency_rank = Some(100);
    entry.cefr_level = Some("A1".to_string());
    entry.is_core_lexicon = true;
    entry.senses = vec![
        sense_with_children(id, "first meaning", 0, 2, 1),
        sense_with_children(id, "second meaning", 1, 2, 1),
    ];
    entry.pronunciations = vec![RefPronunciation {
        id: Uuid::new_v4(),
        ref_entry_id: id,
        transcription: Some("/rʌn/".to_string()),
        audio_url: Some("https://audio.example.org/run.ogg".to_string()),
        region: Some("us".to_string()),
        source_slug: "cmu".to_string(),
    }];
    entry.images = vec![RefImage {
        id: Uuid::new_v4(),
        ref_entry_id: id,
        url: "https://img.example.org/run.png".to_string(),
        caption: Some("a runner".to_string()),
        source_slug: "openverse".to_string(),
    }];
    entry
}
