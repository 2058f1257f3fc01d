//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `organize`: run a batch over a source tree
//! - `rollback`: undo a batch or a single move
//! - `journal`: list batches and their move operations
//! - `config`: show or write the configuration file

mod journal;
mod organize;
mod rollback;
mod settings;

use clap::{Args, Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;
use crate::model::OrganizationMode;

pub use journal::cmd_journal;
pub use organize::cmd_organize;
pub use rollback::cmd_rollback;
pub use settings::cmd_config;

/// Album organizer CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "ALBUM_ORGANIZER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Organize every album under a source directory
    Organize(OrganizeArgs),
    /// Undo journaled moves
    Rollback {
        /// Roll back every move of this batch
        #[arg(long, conflicts_with = "operation", required_unless_present = "operation")]
        batch: Option<String>,
        /// Roll back a single move operation
        #[arg(long)]
        operation: Option<i64>,
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show the move journal
    Journal {
        /// Only show operations of this batch
        #[arg(long)]
        batch: Option<String>,
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write it to the config file (`--config` or the default location)
        #[arg(long)]
        init: bool,
    },
}

/// Options of the `organize` command. Flags override the config file.
#[derive(Args, Debug, Clone)]
pub struct OrganizeArgs {
    /// Directory containing the albums to organize
    #[arg(short, long)]
    pub source: PathBuf,
    /// Library root (defaults to `library.destination` from the config)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,
    /// Actually move files (without this, nothing is touched)
    #[arg(long = "move", conflicts_with = "dry_run")]
    pub move_files: bool,
    /// Show what would be done without moving anything
    #[arg(long)]
    pub dry_run: bool,
    /// Number of parallel workers
    #[arg(long)]
    pub parallel: Option<usize>,
    /// Apply label, series, remix and underground rules
    #[arg(long)]
    pub enable_electronic: bool,
    /// Also query Discogs (needs a token in the config or DISCOGS_TOKEN)
    #[arg(long)]
    pub discogs: bool,
    #[arg(long, env = "DISCOGS_TOKEN", hide_env_values = true)]
    pub discogs_token: Option<String>,
    /// Skip external catalog lookups
    #[arg(long)]
    pub no_enrich: bool,
    /// Minimum confidence for catalog metadata to be applied (0.0-1.0)
    #[arg(long)]
    pub confidence_threshold: Option<f32>,
    /// Skip directories already processed with unchanged content
    #[arg(long)]
    pub incremental: bool,
    /// Force every album into one mode
    #[arg(long)]
    pub mode: Option<OrganizationMode>,
    /// Database path
    #[arg(long)]
    pub db: Option<PathBuf>,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    match &cli.command {
        Commands::Organize(args) => cmd_organize(&rt, config, args),
        Commands::Rollback { batch, operation, db } => {
            cmd_rollback(&rt, &config, batch.as_deref(), *operation, db.as_deref())
        }
        Commands::Journal { batch, db } => cmd_journal(&rt, &config, batch.as_deref(), db.as_deref()),
        Commands::Config { init } => cmd_config(&config, cli.config.as_deref(), *init),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open the state store: `--db`, then the config, then the data directory.
pub(crate) async fn open_db(config: &Config, db_override: Option<&Path>) -> anyhow::Result<SqlitePool> {
    let path = db_override
        .map(Path::to_path_buf)
        .or_else(|| config.library.database.clone())
        .or_else(config::default_database_path);

    if let Some(parent) = path.as_deref().and_then(Path::parent)
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let url = db::db_url(path.as_deref());
    tracing::debug!(target: "cli", %url, "Opening state store");
    Ok(db::init_db(&url).await?)
}
