//! Append-only move journal.
//!
//! Every file move is journaled before it touches the filesystem:
//! `pending` row, filesystem change, then `completed` or `failed`. Those two
//! transitions are the only in-place updates and both are guarded by
//! `WHERE status = 'pending'`. Rollbacks never edit the original row; they
//! append a `rolled_back` row that references it.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};

use crate::model::{MoveOperation, MoveStatus};
use crate::scanner::FileFingerprint;

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MoveRow {
    operation_id: i64,
    batch_id: String,
    source_path: String,
    dest_path: String,
    status: String,
    size: Option<i64>,
    mtime: Option<i64>,
    content_hash: Option<String>,
    rolls_back: Option<i64>,
    message: Option<String>,
    created_at: String,
}

impl From<MoveRow> for MoveOperation {
    fn from(row: MoveRow) -> Self {
        MoveOperation {
            operation_id: row.operation_id,
            batch_id: row.batch_id,
            source_path: PathBuf::from(row.source_path),
            dest_path: PathBuf::from(row.dest_path),
            // The CHECK constraint keeps unknown values out; treat any as failed
            status: row.status.parse().unwrap_or(MoveStatus::Failed),
            size: row.size.map(|s| s as u64),
            mtime: row.mtime,
            content_hash: row.content_hash,
            rolls_back: row.rolls_back,
            message: row.message,
            timestamp: row.created_at.parse().unwrap_or_else(|_| Utc::now()),
        }
    }
}

const SELECT_MOVES: &str = r#"
    SELECT operation_id, batch_id, source_path, dest_path, status, size, mtime,
           content_hash, rolls_back, message, created_at
    FROM moves
"#;

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Writes
// ============================================================================

/// Record the intent to move `source` to `dest`.
///
/// # Returns
///
/// The new operation id.
pub async fn append_pending(
    pool: &SqlitePool,
    batch_id: &str,
    source: &Path,
    dest: &Path,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO moves (batch_id, source_path, dest_path, status, created_at)
        VALUES (?, ?, ?, 'pending', ?)
        RETURNING operation_id
        "#,
    )
    .bind(batch_id)
    .bind(path_str(source))
    .bind(path_str(dest))
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Confirm a pending operation, storing the fingerprint rollback will verify.
///
/// Returns false if the operation was not pending.
pub async fn mark_completed(
    pool: &SqlitePool,
    operation_id: i64,
    fingerprint: &FileFingerprint,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE moves
        SET status = 'completed', size = ?, mtime = ?, content_hash = ?
        WHERE operation_id = ? AND status = 'pending'
        "#,
    )
    .bind(fingerprint.size as i64)
    .bind(fingerprint.mtime)
    .bind(&fingerprint.hash)
    .bind(operation_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a pending operation failed.
///
/// Returns false if the operation was not pending.
pub async fn mark_failed(pool: &SqlitePool, operation_id: i64, message: &str) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE moves SET status = 'failed', message = ? WHERE operation_id = ? AND status = 'pending'",
    )
    .bind(message)
    .bind(operation_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Append a `rolled_back` entry superseding `original`.
///
/// The unique index on `rolls_back` makes a second rollback of the same
/// operation fail at the database level.
pub async fn append_rolled_back(pool: &SqlitePool, original: &MoveOperation) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO moves (
            batch_id, source_path, dest_path, status, size, mtime,
            content_hash, rolls_back, created_at
        )
        VALUES (?, ?, ?, 'rolled_back', ?, ?, ?, ?, ?)
        RETURNING operation_id
        "#,
    )
    .bind(&original.batch_id)
    .bind(path_str(&original.source_path))
    .bind(path_str(&original.dest_path))
    .bind(original.size.map(|s| s as i64))
    .bind(original.mtime)
    .bind(&original.content_hash)
    .bind(original.operation_id)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

// ============================================================================
// Queries
// ============================================================================

pub async fn get_operation(pool: &SqlitePool, operation_id: i64) -> sqlx::Result<Option<MoveOperation>> {
    let row: Option<MoveRow> = sqlx::query_as(&format!("{SELECT_MOVES} WHERE operation_id = ?"))
        .bind(operation_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Into::into))
}

/// Whether a `rolled_back` entry already references `operation_id`.
pub async fn is_rolled_back(pool: &SqlitePool, operation_id: i64) -> sqlx::Result<bool> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM moves WHERE rolls_back = ?")
        .bind(operation_id)
        .fetch_one(pool)
        .await?;

    Ok(row.0 > 0)
}

/// Completed operations of a batch that have not been rolled back, newest first.
pub async fn completed_for_batch(pool: &SqlitePool, batch_id: &str) -> sqlx::Result<Vec<MoveOperation>> {
    let rows: Vec<MoveRow> = sqlx::query_as(&format!(
        r#"{SELECT_MOVES}
        WHERE batch_id = ? AND status = 'completed'
          AND operation_id NOT IN (SELECT rolls_back FROM moves WHERE rolls_back IS NOT NULL)
        ORDER BY operation_id DESC"#
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// All journal entries, optionally limited to one batch, oldest first.
pub async fn list_operations(pool: &SqlitePool, batch_id: Option<&str>) -> sqlx::Result<Vec<MoveOperation>> {
    let rows: Vec<MoveRow> = match batch_id {
        Some(batch) => {
            sqlx::query_as(&format!("{SELECT_MOVES} WHERE batch_id = ? ORDER BY operation_id"))
                .bind(batch)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as(&format!("{SELECT_MOVES} ORDER BY operation_id"))
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Entries left `pending` by an interrupted run.
pub async fn pending_operations(pool: &SqlitePool) -> sqlx::Result<Vec<MoveOperation>> {
    let rows: Vec<MoveRow> =
        sqlx::query_as(&format!("{SELECT_MOVES} WHERE status = 'pending' ORDER BY operation_id"))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Number of journal entries, all batches or one.
pub async fn count_operations(pool: &SqlitePool, batch_id: Option<&str>) -> sqlx::Result<i64> {
    let row: (i64,) = match batch_id {
        Some(batch) => {
            sqlx::query_as("SELECT COUNT(*) FROM moves WHERE batch_id = ?")
                .bind(batch)
                .fetch_one(pool)
                .await?
        }
        None => sqlx::query_as("SELECT COUNT(*) FROM moves").fetch_one(pool).await?,
    };

    Ok(row.0)
}

/// Per-batch status counts, for the `journal` listing.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BatchJournalSummary {
    pub batch_id: String,
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
    pub rolled_back: i64,
    pub started_at: String,
}

pub async fn batch_summaries(pool: &SqlitePool) -> sqlx::Result<Vec<BatchJournalSummary>> {
    sqlx::query_as(
        r#"
        SELECT batch_id,
               SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END) AS pending,
               SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed,
               SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed,
               SUM(CASE WHEN status = 'rolled_back' THEN 1 ELSE 0 END) AS rolled_back,
               MIN(created_at) AS started_at
        FROM moves
        GROUP BY batch_id
        ORDER BY MIN(operation_id)
        "#,
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    fn fingerprint() -> FileFingerprint {
        FileFingerprint {
            size: 42,
            mtime: 1_700_000_000,
            hash: "abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pending_then_completed() {
        let (pool, _dir) = temp_db().await;

        let id = append_pending(&pool, "b1", Path::new("/in/a.flac"), Path::new("/out/a.flac"))
            .await
            .unwrap();
        let op = get_operation(&pool, id).await.unwrap().unwrap();
        assert_eq!(op.status, MoveStatus::Pending);
        assert_eq!(op.size, None);

        assert!(mark_completed(&pool, id, &fingerprint()).await.unwrap());
        let op = get_operation(&pool, id).await.unwrap().unwrap();
        assert_eq!(op.status, MoveStatus::Completed);
        assert_eq!(op.size, Some(42));
        assert_eq!(op.content_hash.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_completed_rows_are_never_updated_again() {
        let (pool, _dir) = temp_db().await;

        let id = append_pending(&pool, "b1", Path::new("/a"), Path::new("/b")).await.unwrap();
        assert!(mark_completed(&pool, id, &fingerprint()).await.unwrap());
        assert!(!mark_failed(&pool, id, "late failure").await.unwrap());
        assert!(!mark_completed(&pool, id, &fingerprint()).await.unwrap());

        let op = get_operation(&pool, id).await.unwrap().unwrap();
        assert_eq!(op.status, MoveStatus::Completed);
        assert_eq!(op.message, None);
    }

    #[tokio::test]
    async fn test_completed_for_batch_is_newest_first_and_skips_rolled_back() {
        let (pool, _dir) = temp_db().await;

        let mut ids = Vec::new();
        for name in ["1", "2", "3"] {
            let id = append_pending(&pool, "b1", Path::new(name), Path::new(name)).await.unwrap();
            mark_completed(&pool, id, &fingerprint()).await.unwrap();
            ids.push(id);
        }
        let other = append_pending(&pool, "b2", Path::new("x"), Path::new("y")).await.unwrap();
        mark_completed(&pool, other, &fingerprint()).await.unwrap();

        let ops = completed_for_batch(&pool, "b1").await.unwrap();
        let got: Vec<i64> = ops.iter().map(|o| o.operation_id).collect();
        assert_eq!(got, vec![ids[2], ids[1], ids[0]]);

        append_rolled_back(&pool, &ops[0]).await.unwrap();
        assert!(is_rolled_back(&pool, ids[2]).await.unwrap());
        let remaining = completed_for_batch(&pool, "b1").await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_double_rollback_is_rejected() {
        let (pool, _dir) = temp_db().await;

        let id = append_pending(&pool, "b1", Path::new("a"), Path::new("b")).await.unwrap();
        mark_completed(&pool, id, &fingerprint()).await.unwrap();
        let op = get_operation(&pool, id).await.unwrap().unwrap();

        append_rolled_back(&pool, &op).await.unwrap();
        assert!(append_rolled_back(&pool, &op).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_summaries() {
        let (pool, _dir) = temp_db().await;

        let a = append_pending(&pool, "b1", Path::new("a"), Path::new("b")).await.unwrap();
        mark_completed(&pool, a, &fingerprint()).await.unwrap();
        let b = append_pending(&pool, "b1", Path::new("c"), Path::new("d")).await.unwrap();
        mark_failed(&pool, b, "boom").await.unwrap();
        append_pending(&pool, "b2", Path::new("e"), Path::new("f")).await.unwrap();

        let summaries = batch_summaries(&pool).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].batch_id, "b1");
        assert_eq!((summaries[0].completed, summaries[0].failed), (1, 1));
        assert_eq!(summaries[1].pending, 1);

        assert_eq!(pending_operations(&pool).await.unwrap().len(), 1);
        assert_eq!(count_operations(&pool, Some("b1")).await.unwrap(), 2);
        assert_eq!(count_operations(&pool, None).await.unwrap(), 3);
    }
}
