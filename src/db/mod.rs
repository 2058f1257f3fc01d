//! State store: the durable record of what the pipeline has done.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. Provides:
//! - The append-only move journal ([`journal`])
//! - Organized album rows, release counters and incremental-mode markers ([`albums`])
//! - The enrichment metadata cache ([`cache`])
//!
//! All workers share one pool. SQLite serializes writers; counters are
//! incremented with single-statement UPSERTs inside the transaction that
//! records the album, so concurrent workers never lose an update.
//!
//! # Example
//!
//! ```ignore
//! use album_organizer::db::init_db;
//!
//! let pool = init_db("sqlite:album_organizer.db").await?;
//! let pending = db::journal::pending_operations(&pool).await?;
//! ```

pub mod albums;
pub mod cache;
pub mod journal;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "album_organizer.db";

/// How long a writer waits for SQLite's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, enables WAL so readers do
/// not block the journal writer, and runs all pending migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Cheap liveness check used before starting a batch.
pub async fn ping(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
