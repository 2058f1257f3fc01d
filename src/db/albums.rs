//! Organized albums, release counters and incremental-mode markers.
//!
//! Recording an album is one transaction: the `albums` row, the release
//! counter increments and the processed markers commit together, so a crash
//! never leaves counters that disagree with the albums table.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use std::path::Path;

use crate::model::text::{catalog_prefix, is_placeholder_artist, normalize};
use crate::model::{MetadataRecord, OrganizationMode, QualityClass};

/// Counter families used by the decision rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountKind {
    Artist,
    Label,
    Series,
}

impl CountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Label => "label",
            Self::Series => "series",
        }
    }
}

/// Counter key for a label + catalog-prefix series.
pub fn series_key(label: Option<&str>, catalog_number: &str) -> Option<String> {
    let prefix = catalog_prefix(catalog_number)?;
    let label = label.map(normalize).unwrap_or_default();
    Some(format!("{label}|{prefix}"))
}

/// The counters an organized release increments.
pub fn counter_keys(record: &MetadataRecord) -> Vec<(CountKind, String)> {
    let mut keys = Vec::with_capacity(3);
    if let Some(artist) = record.artist.as_deref()
        && !is_placeholder_artist(Some(artist))
    {
        keys.push((CountKind::Artist, normalize(artist)));
    }
    if let Some(label) = record.label.as_deref().map(normalize)
        && !label.is_empty()
    {
        keys.push((CountKind::Label, label));
    }
    if let Some(key) = record
        .catalog_number
        .as_deref()
        .and_then(|c| series_key(record.label.as_deref(), c))
    {
        keys.push((CountKind::Series, key));
    }
    keys
}

/// Existing organized release counts for one candidate release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseCounts {
    pub artist: i64,
    pub label: i64,
    pub series: i64,
}

/// An album ready to be written to the `albums` table.
#[derive(Debug, Clone)]
pub struct NewAlbum<'a> {
    pub batch_id: &'a str,
    pub source_path: &'a Path,
    pub destination_path: &'a Path,
    pub record: &'a MetadataRecord,
    pub quality: QualityClass,
    pub mode: OrganizationMode,
    pub rule_trace: String,
    /// Content hash of the album's audio, keys the processed markers
    pub content_hash: &'a str,
}

/// A stored `albums` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlbumRow {
    pub id: i64,
    pub batch_id: String,
    pub source_path: String,
    pub destination_path: String,
    pub artist: Option<String>,
    pub album_title: Option<String>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub source_name: String,
    pub confidence: f64,
    pub quality: String,
    pub organization_mode: String,
    pub rule_trace: String,
}

/// Record an organized album.
///
/// Inserts the album row, increments its release counters and marks both the
/// source and the destination directories as processed, in one transaction.
///
/// # Returns
///
/// The database ID of the album row.
pub async fn record_album(pool: &SqlitePool, album: &NewAlbum<'_>) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;
    let now = Utc::now().to_rfc3339();
    let record = album.record;

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO albums (
            batch_id, source_path, destination_path, artist, album_title, year,
            label, catalog_number, genre, source_name, source_id, confidence,
            quality, organization_mode, rule_trace, organized_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(album.batch_id)
    .bind(album.source_path.to_string_lossy().into_owned())
    .bind(album.destination_path.to_string_lossy().into_owned())
    .bind(&record.artist)
    .bind(&record.album_title)
    .bind(record.year)
    .bind(&record.label)
    .bind(&record.catalog_number)
    .bind(&record.genre)
    .bind(record.source_name.as_str())
    .bind(&record.source_id)
    .bind(record.confidence as f64)
    .bind(album.quality.as_str())
    .bind(album.mode.as_str())
    .bind(&album.rule_trace)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await?;

    for (kind, name) in counter_keys(record) {
        sqlx::query(
            r#"
            INSERT INTO release_counts (kind, name, count) VALUES (?, ?, 1)
            ON CONFLICT(kind, name) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(kind.as_str())
        .bind(&name)
        .execute(&mut *tx)
        .await?;
    }

    for path in [album.source_path, album.destination_path] {
        insert_marker(&mut tx, path, album.content_hash, Some(album.destination_path), Some(album.batch_id), &now)
            .await?;
    }

    tx.commit().await?;
    Ok(row.0)
}

async fn insert_marker(
    tx: &mut Transaction<'_, Sqlite>,
    path: &Path,
    content_hash: &str,
    destination: Option<&Path>,
    batch_id: Option<&str>,
    now: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO processed_directories (source_path, content_hash, destination_path, batch_id, processed_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(source_path, content_hash) DO UPDATE SET
            destination_path = excluded.destination_path,
            batch_id = excluded.batch_id,
            processed_at = excluded.processed_at
        "#,
    )
    .bind(path.to_string_lossy().into_owned())
    .bind(content_hash)
    .bind(destination.map(|d| d.to_string_lossy().into_owned()))
    .bind(batch_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Mark a directory processed without recording an album. `destination` is
/// where its files went, if they moved.
pub async fn mark_processed(
    pool: &SqlitePool,
    path: &Path,
    content_hash: &str,
    destination: Option<&Path>,
    batch_id: Option<&str>,
) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    insert_marker(&mut tx, path, content_hash, destination, batch_id, &Utc::now().to_rfc3339()).await?;
    tx.commit().await
}

/// Whether this directory, with this exact content, was already processed.
pub async fn is_processed(pool: &SqlitePool, path: &Path, content_hash: &str) -> sqlx::Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM processed_directories WHERE source_path = ? AND content_hash = ?",
    )
    .bind(path.to_string_lossy().into_owned())
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Current value of one counter. Names are normalized before lookup.
pub async fn release_count(pool: &SqlitePool, kind: CountKind, name: &str) -> sqlx::Result<i64> {
    let key = match kind {
        CountKind::Series => name.to_string(),
        _ => normalize(name),
    };
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT count FROM release_counts WHERE kind = ? AND name = ?")
            .bind(kind.as_str())
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|r| r.0).unwrap_or(0))
}

/// Counts the decision rules need for one release.
pub async fn counts_for(pool: &SqlitePool, record: &MetadataRecord) -> sqlx::Result<ReleaseCounts> {
    let mut counts = ReleaseCounts::default();
    for (kind, name) in counter_keys(record) {
        let value = release_count(pool, kind, &name).await?;
        match kind {
            CountKind::Artist => counts.artist = value,
            CountKind::Label => counts.label = value,
            CountKind::Series => counts.series = value,
        }
    }
    Ok(counts)
}

/// Albums recorded by one batch.
pub async fn albums_for_batch(pool: &SqlitePool, batch_id: &str) -> sqlx::Result<Vec<AlbumRow>> {
    sqlx::query_as(
        r#"
        SELECT id, batch_id, source_path, destination_path, artist, album_title, label,
               catalog_number, source_name, confidence, quality, organization_mode, rule_trace
        FROM albums WHERE batch_id = ? ORDER BY id
        "#,
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await
}

/// Drop the processed markers written for the album a batch moved into
/// `destination`, so the directories are looked at again next run.
///
/// # Returns
///
/// Number of markers removed.
pub async fn forget_markers(pool: &SqlitePool, batch_id: &str, destination: &Path) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM processed_directories WHERE batch_id = ? AND destination_path = ?")
        .bind(batch_id)
        .bind(destination.to_string_lossy().into_owned())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Undo everything [`record_album`] wrote for the album a batch moved into
/// `destination`: the album row, its counter increments and its markers.
///
/// # Returns
///
/// Whether an album row was removed.
pub async fn unrecord_album(pool: &SqlitePool, batch_id: &str, destination: &Path) -> sqlx::Result<bool> {
    let destination = destination.to_string_lossy().into_owned();
    let mut tx = pool.begin().await?;

    let records: Vec<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT artist, label, catalog_number FROM albums WHERE batch_id = ? AND destination_path = ?",
    )
    .bind(batch_id)
    .bind(&destination)
    .fetch_all(&mut *tx)
    .await?;

    for (artist, label, catalog_number) in records {
        let record = MetadataRecord {
            artist,
            label,
            catalog_number,
            ..MetadataRecord::local(0.0)
        };
        for (kind, name) in counter_keys(&record) {
            sqlx::query("UPDATE release_counts SET count = count - 1 WHERE kind = ? AND name = ?")
                .bind(kind.as_str())
                .bind(&name)
                .execute(&mut *tx)
                .await?;
        }
    }
    sqlx::query("DELETE FROM release_counts WHERE count <= 0")
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM processed_directories WHERE batch_id = ? AND destination_path = ?")
        .bind(batch_id)
        .bind(&destination)
        .execute(&mut *tx)
        .await?;

    let removed = sqlx::query("DELETE FROM albums WHERE batch_id = ? AND destination_path = ?")
        .bind(batch_id)
        .bind(&destination)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(removed > 0)
}
