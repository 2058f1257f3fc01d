//! Undoing journaled moves, and recovering from interrupted ones.
//!
//! Rollback walks completed operations newest first. Before touching a file it
//! checks that the destination still has the size and content hash recorded
//! when the move completed; any mismatch halts the rollback at that entry.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::fsops::{self, partial_path};
use super::MoveError;
use crate::db::{albums, journal};
use crate::model::{MoveOperation, MoveStatus};
use crate::scanner::{FileFingerprint, compute_file_hash};

/// What to roll back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Every completed operation of a batch
    Batch(String),
    /// A single operation
    Operation(i64),
}

/// Journal inconsistency or failure that stops a rollback.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("Operation {0} does not exist")]
    NotFound(i64),

    #[error("Operation {operation_id} is {status:?}; only completed moves can be rolled back")]
    NotCompleted { operation_id: i64, status: MoveStatus },

    #[error("Operation {0} was already rolled back")]
    AlreadyRolledBack(i64),

    #[error("Operation {operation_id}: {path} no longer exists")]
    DestinationMissing { operation_id: i64, path: PathBuf },

    #[error("Operation {operation_id}: {path} changed since it was moved")]
    ContentChanged { operation_id: i64, path: PathBuf },

    #[error("Operation {operation_id}: journal entry has no fingerprint")]
    MissingFingerprint { operation_id: i64 },

    #[error("Operation {operation_id}: original location {path} is occupied")]
    SourceOccupied { operation_id: i64, path: PathBuf },

    #[error("Operation {operation_id}: {error}")]
    Move { operation_id: i64, error: MoveError },

    #[error("Journal error: {0}")]
    Journal(#[from] sqlx::Error),
}

impl RollbackError {
    /// The operation the rollback halted at, if any.
    pub fn operation_id(&self) -> Option<i64> {
        match self {
            Self::NotFound(id) | Self::AlreadyRolledBack(id) => Some(*id),
            Self::NotCompleted { operation_id, .. }
            | Self::DestinationMissing { operation_id, .. }
            | Self::ContentChanged { operation_id, .. }
            | Self::MissingFingerprint { operation_id }
            | Self::SourceOccupied { operation_id, .. }
            | Self::Move { operation_id, .. } => Some(*operation_id),
            Self::Journal(_) => None,
        }
    }
}

/// One restored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    /// The move that was undone
    pub operation_id: i64,
    /// The `rolled_back` journal entry
    pub rollback_operation_id: i64,
    pub restored_path: PathBuf,
    pub removed_path: PathBuf,
}

/// Result of a rollback run. `error` is set when the run halted early; the
/// outcomes are the files restored before that point.
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub outcomes: Vec<RollbackOutcome>,
    pub error: Option<RollbackError>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Roll back `target`.
///
/// Emptied destination directories are removed up to, but never including,
/// `library_root`. Without a root only the file's own directory is removed
/// when it ends up empty.
///
/// Every restored file drops the processed markers of its album, so a halted
/// rollback never leaves a restored album marked as done. Once the last file
/// of an album is back, its album record and release counters go too.
pub async fn rollback(
    pool: &SqlitePool,
    target: &RollbackTarget,
    library_root: Option<&Path>,
) -> Result<RollbackReport, RollbackError> {
    let operations = match target {
        RollbackTarget::Batch(batch_id) => journal::completed_for_batch(pool, batch_id).await?,
        RollbackTarget::Operation(id) => {
            let op = journal::get_operation(pool, *id)
                .await?
                .ok_or(RollbackError::NotFound(*id))?;
            if op.status != MoveStatus::Completed {
                return Err(RollbackError::NotCompleted {
                    operation_id: op.operation_id,
                    status: op.status,
                });
            }
            if journal::is_rolled_back(pool, op.operation_id).await? {
                return Err(RollbackError::AlreadyRolledBack(op.operation_id));
            }
            vec![op]
        }
    };

    tracing::info!(target: "organizer::rollback", ?target, operations = operations.len(), "Starting rollback");

    let mut report = RollbackReport::default();
    for op in &operations {
        match restore(pool, op, library_root).await {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => {
                tracing::error!(
                    target: "organizer::rollback",
                    operation_id = op.operation_id,
                    error = %e,
                    "Rollback halted"
                );
                report.error = Some(e);
                return Ok(report);
            }
        }
    }

    if let RollbackTarget::Batch(batch_id) = target {
        tracing::info!(target: "organizer::rollback", %batch_id, files = report.outcomes.len(), "Batch rolled back");
    }
    Ok(report)
}

/// Forget the bookkeeping of the album `op` moved a file into.
async fn forget_album(pool: &SqlitePool, op: &MoveOperation) -> sqlx::Result<()> {
    let Some(dest_dir) = op.dest_path.parent() else {
        return Ok(());
    };
    albums::forget_markers(pool, &op.batch_id, dest_dir).await?;

    let album_still_moved = journal::completed_for_batch(pool, &op.batch_id)
        .await?
        .iter()
        .any(|other| other.dest_path.parent() == Some(dest_dir));
    if !album_still_moved && albums::unrecord_album(pool, &op.batch_id, dest_dir).await? {
        tracing::info!(
            target: "organizer::rollback",
            batch_id = %op.batch_id,
            album = %dest_dir.display(),
            "Album fully restored"
        );
    }
    Ok(())
}

async fn restore(
    pool: &SqlitePool,
    op: &MoveOperation,
    library_root: Option<&Path>,
) -> Result<RollbackOutcome, RollbackError> {
    let id = op.operation_id;
    let (Some(size), Some(hash)) = (op.size, op.content_hash.clone()) else {
        return Err(RollbackError::MissingFingerprint { operation_id: id });
    };
    if !op.dest_path.exists() {
        return Err(RollbackError::DestinationMissing {
            operation_id: id,
            path: op.dest_path.clone(),
        });
    }
    if op.source_path.exists() {
        return Err(RollbackError::SourceOccupied {
            operation_id: id,
            path: op.source_path.clone(),
        });
    }

    let expected = FileFingerprint {
        size,
        mtime: op.mtime.unwrap_or_default(),
        hash,
    };
    let dest = op.dest_path.clone();
    let source = op.source_path.clone();
    let moved = tokio::task::spawn_blocking(move || -> Result<bool, MoveError> {
        let unchanged = expected.matches(&dest).map_err(|e| MoveError::Io {
            source_path: dest.clone(),
            dest: source.clone(),
            source: e,
        })?;
        if !unchanged {
            return Ok(false);
        }
        fsops::move_file(&dest, &source)?;
        Ok(true)
    })
    .await
    .map_err(|e| RollbackError::Move {
        operation_id: id,
        error: MoveError::Io {
            source_path: op.dest_path.clone(),
            dest: op.source_path.clone(),
            source: std::io::Error::other(e.to_string()),
        },
    })?
    .map_err(|error| RollbackError::Move { operation_id: id, error })?;

    if !moved {
        return Err(RollbackError::ContentChanged {
            operation_id: id,
            path: op.dest_path.clone(),
        });
    }

    let rollback_operation_id = journal::append_rolled_back(pool, op).await?;
    forget_album(pool, op).await?;
    tracing::debug!(
        target: "organizer::rollback",
        operation_id = id,
        rollback_operation_id,
        restored = %op.source_path.display(),
        "Restored file"
    );

    if let Some(parent) = op.dest_path.parent() {
        let stop = library_root
            .filter(|root| parent.starts_with(root))
            .map(Path::to_path_buf)
            .or_else(|| parent.parent().map(Path::to_path_buf));
        if let Some(stop) = stop
            && let Err(e) = fsops::remove_empty_dirs(parent, &stop)
        {
            tracing::debug!(target: "organizer::rollback", error = %e, "Could not prune empty directories");
        }
    }

    Ok(RollbackOutcome {
        operation_id: id,
        rollback_operation_id,
        restored_path: op.source_path.clone(),
        removed_path: op.dest_path.clone(),
    })
}

/// Counts from a recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub completed: usize,
    pub failed: usize,
}

/// Resolve `pending` entries left by a crash.
///
/// Entries of the batches in `in_flight` belong to moves still running in
/// this process and are left alone.
///
/// A pending entry whose file sits at the destination and not at the source
/// finished moving and is marked completed. Anything else is marked failed;
/// a verified copy left next to a surviving source is removed.
pub async fn recover_pending(pool: &SqlitePool, in_flight: &HashSet<String>) -> sqlx::Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let pending = journal::pending_operations(pool).await?;
    for op in pending.into_iter().filter(|op| !in_flight.contains(&op.batch_id)) {
        let _ = std::fs::remove_file(partial_path(&op.dest_path));

        let dest_exists = op.dest_path.exists();
        let source_exists = op.source_path.exists();

        if dest_exists && !source_exists {
            match FileFingerprint::of(&op.dest_path) {
                Ok(fingerprint) => {
                    journal::mark_completed(pool, op.operation_id, &fingerprint).await?;
                    report.completed += 1;
                    tracing::info!(
                        target: "organizer::journal",
                        operation_id = op.operation_id,
                        "Recovered interrupted move as completed"
                    );
                    continue;
                }
                Err(e) => {
                    journal::mark_failed(pool, op.operation_id, &format!("interrupted; unreadable destination: {e}"))
                        .await?;
                    report.failed += 1;
                    continue;
                }
            }
        }

        let mut message = "interrupted before completion".to_string();
        if dest_exists && source_exists && same_content(&op.source_path, &op.dest_path) {
            if std::fs::remove_file(&op.dest_path).is_ok() {
                message.push_str("; duplicate copy removed");
            }
        }
        journal::mark_failed(pool, op.operation_id, &message).await?;
        report.failed += 1;
        tracing::warn!(
            target: "organizer::journal",
            operation_id = op.operation_id,
            source = %op.source_path.display(),
            "Interrupted move marked failed"
        );
    }
    Ok(report)
}

fn same_content(a: &Path, b: &Path) -> bool {
    match (compute_file_hash(a), compute_file_hash(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
