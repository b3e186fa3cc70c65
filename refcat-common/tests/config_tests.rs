//! Tests for configuration resolution
//!
//! Priority order: command line > environment > TOML file > defaults.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate REFCAT_DATABASE or REFCAT_LOG_LEVEL are marked with
//! #[serial] so they run sequentially, not in parallel.

use refcat_common::config::{CatalogConfig, ConfigOverrides, ENV_DATABASE, ENV_LOG_LEVEL};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn clear_env() {
    env::remove_var(ENV_DATABASE);
    env::remove_var(ENV_LOG_LEVEL);
}

#[test]
#[serial]
fn test_file_values_used_without_overrides() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        database_path = "/srv/refcat/catalog.db"
        log_level = "debug"
        enrichment_source_slug = "gpt"
        "#,
    );

    let config = CatalogConfig::load(&ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(config.database_path, PathBuf::from("/srv/refcat/catalog.db"));
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.enrichment_source_slug, "gpt");
    // Absent keys keep compiled defaults
    assert_eq!(config.bulk_chunk_size, 500);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "database_path = \"/from/file.db\"\n");

    env::set_var(ENV_DATABASE, "/from/env.db");
    env::set_var(ENV_LOG_LEVEL, "warn");

    let config = CatalogConfig::load(&ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(config.database_path, PathBuf::from("/from/env.db"));
    assert_eq!(config.log_level, "warn");

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "database_path = \"/from/file.db\"\n");

    env::set_var(ENV_DATABASE, "/from/env.db");

    let config = CatalogConfig::load(&ConfigOverrides {
        config_file: Some(path),
        database_path: Some(PathBuf::from("/from/cli.db")),
        log_level: Some("trace".to_string()),
    })
    .unwrap();

    assert_eq!(config.database_path, PathBuf::from("/from/cli.db"));
    assert_eq!(config.log_level, "trace");

    clear_env();
}

#[test]
#[serial]
fn test_empty_env_value_ignored() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "database_path = \"/from/file.db\"\n");

    env::set_var(ENV_DATABASE, "");

    let config = CatalogConfig::load(&ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(config.database_path, PathBuf::from("/from/file.db"));

    clear_env();
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let result = CatalogConfig::load(&ConfigOverrides {
        config_file: Some(dir.path().join("absent.toml")),
        ..Default::default()
    });
    assert!(result.is_err(), "An explicitly named config file must exist");
}

#[test]
#[serial]
fn test_invalid_values_rejected_at_load() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "bulk_chunk_size = 0\n");

    let result = CatalogConfig::load(&ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    });
    assert!(result.is_err());
}
