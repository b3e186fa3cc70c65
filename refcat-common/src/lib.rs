//! # Reference Catalog common library
//!
//! Shared code for the catalog store and its tooling:
//! - Domain model of the catalog aggregate
//! - Error taxonomy
//! - Configuration loading
//! - Database bootstrap and migrations
//! - Headword normalization and trigram similarity

pub mod config;
pub mod db;
pub mod error;
pub mod normalize;
pub mod time;
pub mod trigram;
pub mod uuid_utils;

pub use error::{Error, ErrorKind, Result};
pub use normalize::normalize_text;
