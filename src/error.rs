//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Per-stage errors for detailed handling: [`ScanError`],
//!   [`ClassificationError`], [`EnrichmentError`], [`DecisionAmbiguityError`],
//!   [`MoveError`], [`RollbackError`]
//! - [`AlbumError`]: the per-album taxonomy carried on job records. Only
//!   [`AlbumError::is_fatal`] errors abort a batch.

use std::path::PathBuf;

pub use crate::classifier::ClassificationError;
pub use crate::decision::DecisionAmbiguityError;
pub use crate::enrichment::EnrichmentError;
pub use crate::organizer::{MoveError, RollbackError};
pub use crate::scanner::ScanError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Per-album pipeline error
    #[error(transparent)]
    Album(#[from] AlbumError),

    /// Rollback halted or could not start
    #[error("Rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown job id
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// A background batch task panicked or was aborted
    #[error("Batch task failed: {0}")]
    Task(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Errors local to a single album's pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum AlbumError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error(transparent)]
    Decision(#[from] DecisionAmbiguityError),

    #[error(transparent)]
    Move(#[from] MoveError),

    /// State store unreachable or failing
    #[error("State store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Worker task died
    #[error("Worker failure for {album}: {message}")]
    Worker { album: PathBuf, message: String },
}

impl AlbumError {
    /// Errors that make continuing the batch pointless: the state store is
    /// unavailable or the destination disk is full.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Move(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Short machine-friendly kind name, used in progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scan(_) => "ScanError",
            Self::Classification(_) => "ClassificationError",
            Self::Enrichment(_) => "EnrichmentError",
            Self::Decision(_) => "DecisionAmbiguityError",
            Self::Move(_) => "MoveError",
            Self::Store(_) => "StoreError",
            Self::Worker { .. } => "WorkerError",
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
