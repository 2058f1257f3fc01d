//! Enrichment metadata cache.
//!
//! Keyed by normalized `(artist, title, year)`. Entries expire after a TTL.
//! A NULL `record_json` is a cached "no match" so futile lookups are not
//! repeated. The cache is an optimization only; nothing treats it as
//! authoritative.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::time::Duration;

use crate::model::MetadataRecord;
use crate::model::text::normalize;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedLookup {
    /// A fresh positive entry
    Hit(MetadataRecord),
    /// A fresh negative entry
    NoMatch,
    /// Nothing usable cached
    Miss,
}

/// Cache key for a lookup. Case, punctuation and a leading "The" do not
/// change the key.
pub fn cache_key(artist: &str, title: &str, year: Option<i32>) -> String {
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    format!("{}|{}|{}", normalize(artist), normalize(title), year)
}

/// Look up a fresh entry.
///
/// Undecodable entries are reported as a miss and overwritten by the next
/// [`put_cached`].
pub async fn get_cached(pool: &SqlitePool, key: &str) -> sqlx::Result<CachedLookup> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT record_json FROM metadata_cache WHERE cache_key = ? AND expires_at > ?",
    )
    .bind(key)
    .bind(Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        None => CachedLookup::Miss,
        Some((None,)) => CachedLookup::NoMatch,
        Some((Some(json),)) => match serde_json::from_str(&json) {
            Ok(record) => CachedLookup::Hit(record),
            Err(e) => {
                tracing::warn!(target: "enrichment::cache", %key, error = %e, "Discarding corrupt cache entry");
                CachedLookup::Miss
            }
        },
    })
}

/// Store a result; `None` stores a negative entry.
pub async fn put_cached(
    pool: &SqlitePool,
    key: &str,
    record: Option<&MetadataRecord>,
    ttl: Duration,
) -> Result<(), CacheError> {
    let json = record.map(serde_json::to_string).transpose()?;
    let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

    sqlx::query(
        r#"
        INSERT INTO metadata_cache (cache_key, record_json, expires_at)
        VALUES (?, ?, ?)
        ON CONFLICT(cache_key) DO UPDATE SET
            record_json = excluded.record_json,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(key)
    .bind(json)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Drop expired entries.
///
/// # Returns
///
/// Number of entries removed.
pub async fn purge_expired(pool: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM metadata_cache WHERE expires_at <= ?")
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
