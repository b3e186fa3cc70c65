//! refcat - Reference Catalog administration tool
//!
//! Opens (creating and migrating if needed) the catalog database and runs
//! one read or registration command against it. Ctrl-C cancels the
//! in-flight operation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use refcat_common::config::{CatalogConfig, ConfigOverrides};
use refcat_common::db::models::EntryKey;
use refcat_common::{normalize_text, uuid_utils};
use refcat_store::Catalog;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "refcat")]
#[command(about = "Reference catalog administration")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/refcat/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overriding config and REFCAT_DATABASE
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Log level filter, overriding config and REFCAT_LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the database
    Init,
    /// Print an entry with all of its children as JSON
    Show {
        /// Entry id or headword
        key: String,
    },
    /// Fuzzy lookup by headword
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// List registered data sources
    Sources,
    /// List coverage records of an entry
    Coverage { entry_id: Uuid },
    /// Register a headword (no-op if it already exists)
    Register { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CatalogConfig::load(&ConfigOverrides {
        config_file: args.config.clone(),
        database_path: args.database.clone(),
        log_level: args.log_level.clone(),
    })
    .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("refcat v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let catalog = Catalog::open(&config)
        .await
        .context("Failed to open catalog database")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match args.command {
        Command::Init => {
            info!("Database ready");
        }
        Command::Show { key } => {
            let key = match Uuid::parse_str(&key) {
                Ok(id) => EntryKey::Id(id),
                Err(_) => EntryKey::Text(key),
            };
            let entry = catalog.get_full_tree(&cancel, key).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Search { query, limit } => {
            let entries = catalog.search(&cancel, &query, limit).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Sources => {
            let sources = catalog.get_all_data_sources(&cancel).await?;
            println!("{}", serde_json::to_string_pretty(&sources)?);
        }
        Command::Coverage { entry_id } => {
            let coverage = catalog.get_coverage(&cancel, entry_id).await?;
            println!("{}", serde_json::to_string_pretty(&coverage)?);
        }
        Command::Register { text } => {
            let normalized = normalize_text(&text);
            let entry = catalog
                .register_entry(&cancel, uuid_utils::generate(), text.trim(), &normalized)
                .await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }

    Ok(())
}
