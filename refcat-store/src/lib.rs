//! refcat-store - Reference Catalog persistence and reconciliation
//!
//! Stores canonical dictionary entries with their senses, translations,
//! examples, pronunciations and images, and keeps them consistent under
//! concurrent registration, bulk ingestion and enrichment.
//!
//! [`catalog::Catalog`] is the entry point; [`db::RefRepository`] holds the
//! storage paths behind it.

pub mod catalog;
pub mod db;
pub mod utils;

pub use catalog::Catalog;
pub use db::reconcile::ReconcileSummary;
pub use db::{RefRepository, RepoSettings};
