//! Database models, bootstrap and migrations

pub mod init;
pub mod migrations;
pub mod models;
pub mod trigram_index;

pub use init::*;
pub use migrations::*;
pub use models::*;
pub use trigram_index::index_entry;
