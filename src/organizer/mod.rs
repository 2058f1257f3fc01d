//! Moving albums into the library.
//!
//! Every file move is journaled before it happens: a `pending` row is written,
//! the file is moved, and the row is confirmed `completed` with the file's
//! fingerprint or marked `failed`. Rollback reads the same journal.

pub mod duplicate;
pub mod fsops;
pub mod rollback;

use serde::Serialize;
use sqlx::SqlitePool;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::journal;
use crate::model::{AlbumDirectory, QualityClass, RuleHit};
use crate::scanner::{FileFingerprint, ScanError};

pub use duplicate::{AlbumStanding, DestinationClaim, DestinationClaims, DuplicateResolution};
pub use fsops::{move_file, prune_empty_tree, remove_empty_dirs};
pub use rollback::{
    RecoveryReport, RollbackError, RollbackOutcome, RollbackReport, RollbackTarget, recover_pending,
    rollback,
};

/// A single file could not be moved. The source is left in place.
#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("Failed to move {source_path} to {dest}: {source}")]
    Io {
        source_path: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Copy of {path} did not match the original")]
    VerifyFailed { path: PathBuf },

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("Cannot inspect existing destination: {0}")]
    Inspect(#[from] ScanError),

    #[error("Journal error: {0}")]
    Journal(#[from] sqlx::Error),

    /// The pending entry was resolved by someone else while the file moved
    #[error("Journal entry #{operation_id} was settled by another process")]
    JournalConflict { operation_id: i64 },
}

impl MoveError {
    /// Disk full or journal unavailable: no further album can succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == ErrorKind::StorageFull,
            Self::Journal(_) => true,
            _ => false,
        }
    }
}

/// One file's planned source and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedMove {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// What happened to an album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved {
        /// Journal ids, in move order
        operations: Vec<i64>,
        destination: PathBuf,
        /// The album went to a numbered sibling of its decided destination
        disambiguated: bool,
    },
    DryRun {
        planned: Vec<PlannedMove>,
        destination: PathBuf,
    },
    /// An equal or better copy already sits at the destination
    SkippedDuplicate { existing: PathBuf },
}

impl MoveOutcome {
    /// Entry appended to the album's rule trace when a duplicate was found.
    pub fn trace_note(&self) -> Option<RuleHit> {
        let outcome = match self {
            Self::Moved { disambiguated: true, .. } => "disambiguated",
            Self::SkippedDuplicate { .. } => "skipped",
            _ => return None,
        };
        Some(RuleHit {
            rule: "duplicate",
            outcome: outcome.to_string(),
        })
    }
}

/// Plan the moves of every file in `album` into `dest_dir`, audio first.
pub fn plan_moves(album: &AlbumDirectory, dest_dir: &Path) -> Vec<PlannedMove> {
    album
        .audio_files
        .iter()
        .map(|f| f.path.as_path())
        .chain(album.extra_files.iter().map(PathBuf::as_path))
        .filter_map(|source| {
            let name = source.file_name()?;
            Some(PlannedMove {
                source: source.to_path_buf(),
                dest: dest_dir.join(name),
            })
        })
        .collect()
}

/// Performs journaled album moves. Clones share destination claims.
#[derive(Debug, Clone)]
pub struct MoveExecutor {
    pool: SqlitePool,
    claims: Arc<DestinationClaims>,
}

impl MoveExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            claims: DestinationClaims::new(),
        }
    }

    /// Move `album` into `destination`.
    ///
    /// Stops at the first file that fails; files moved before it stay
    /// journaled as completed and can be rolled back. The source album
    /// directory is removed once everything has left it.
    pub async fn execute(
        &self,
        batch_id: &str,
        album: &AlbumDirectory,
        quality: QualityClass,
        destination: &Path,
        dry_run: bool,
    ) -> Result<MoveOutcome, MoveError> {
        let incoming = album.clone();
        let dest = destination.to_path_buf();
        let claims = self.claims.clone();
        let (resolution, _claim) = tokio::task::spawn_blocking(move || {
            // Dry runs reserve nothing
            if dry_run {
                return duplicate::resolve(&incoming, quality, &dest).map(|r| (r, None));
            }
            claims.resolve(&incoming, quality, &dest)
        })
        .await
        .map_err(|e| MoveError::Io {
            source_path: album.path.clone(),
            dest: destination.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })??;

        let (dest_dir, disambiguated) = match resolution {
            DuplicateResolution::Skip { existing } => {
                tracing::info!(
                    target: "organizer::duplicate",
                    album = %album.path.display(),
                    existing = %existing.display(),
                    "Equal or better copy already organized, skipping"
                );
                return Ok(MoveOutcome::SkippedDuplicate { existing });
            }
            DuplicateResolution::Fresh(dir) => (dir, false),
            DuplicateResolution::Disambiguated(dir) => (dir, true),
        };

        let planned = plan_moves(album, &dest_dir);
        if dry_run {
            return Ok(MoveOutcome::DryRun {
                planned,
                destination: dest_dir,
            });
        }

        let mut operations = Vec::with_capacity(planned.len());
        for step in planned {
            let id = journal::append_pending(&self.pool, batch_id, &step.source, &step.dest).await?;

            let task_step = step.clone();
            let moved = tokio::task::spawn_blocking(move || move_file(&task_step.source, &task_step.dest))
                .await
                .unwrap_or_else(|e| {
                    Err(MoveError::Io {
                        source_path: step.source.clone(),
                        dest: step.dest.clone(),
                        source: std::io::Error::other(e.to_string()),
                    })
                });

            match moved {
                Ok(fingerprint) => {
                    self.confirm(id, &step, &fingerprint).await?;
                    tracing::debug!(target: "organizer::journal", operation_id = id, "Move completed");
                    operations.push(id);
                }
                Err(e) => {
                    journal::mark_failed(&self.pool, id, &e.to_string()).await?;
                    tracing::warn!(
                        target: "organizer::journal",
                        operation_id = id,
                        album = %album.path.display(),
                        error = %e,
                        "Move failed"
                    );
                    return Err(e);
                }
            }
        }

        let source_dir = album.path.clone();
        match tokio::task::spawn_blocking(move || prune_empty_tree(&source_dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                target: "organizer",
                album = %album.path.display(),
                error = %e,
                "Could not prune source directory"
            ),
            Err(e) => tracing::warn!(target: "organizer", error = %e, "Prune task failed"),
        }

        tracing::info!(
            target: "organizer",
            album = %album.path.display(),
            destination = %dest_dir.display(),
            files = operations.len(),
            "Album moved"
        );
        Ok(MoveOutcome::Moved {
            operations,
            destination: dest_dir,
            disambiguated,
        })
    }

    /// Mark a moved file completed. An entry that is no longer pending was
    /// settled elsewhere; the file goes back so the disk matches that row.
    async fn confirm(&self, id: i64, step: &PlannedMove, fingerprint: &FileFingerprint) -> Result<(), MoveError> {
        if journal::mark_completed(&self.pool, id, fingerprint).await? {
            return Ok(());
        }
        tracing::warn!(target: "organizer::journal", operation_id = id, "Pending entry was settled elsewhere");
        self.undo_unjournaled(step).await;
        Err(MoveError::JournalConflict { operation_id: id })
    }

    async fn undo_unjournaled(&self, step: &PlannedMove) {
        let back = PlannedMove {
            source: step.dest.clone(),
            dest: step.source.clone(),
        };
        let undone = tokio::task::spawn_blocking(move || move_file(&back.source, &back.dest)).await;
        match undone {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(
                target: "organizer::journal",
                source = %step.source.display(),
                dest = %step.dest.display(),
                error = %e,
                "Could not return file after journal conflict"
            ),
            Err(e) => tracing::error!(target: "organizer::journal", error = %e, "Undo task failed"),
        }
    }
}
