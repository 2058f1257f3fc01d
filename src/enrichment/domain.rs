//! Internal domain models for release lookup.
//!
//! These types are OUR types - they don't change when external APIs change.
//! Catalog responses get converted into these types by each source's adapter.

use crate::model::{MetadataRecord, SourceName};

/// What we know locally about a release, used to query and to score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseQuery {
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub label: Option<String>,
}

impl ReleaseQuery {
    /// Build a query from local metadata. Returns `None` when the record has
    /// no usable title.
    pub fn from_record(record: &MetadataRecord) -> Option<Self> {
        let title = record.album_title.as_deref()?.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            artist: record.artist.clone().unwrap_or_default(),
            title: title.to_string(),
            year: record.year,
            label: record.label.clone(),
        })
    }
}

/// One release returned by a catalog source, before scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseCandidate {
    /// Catalog-specific release id
    pub source_id: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub genre: Option<String>,
    /// Remixing artist credited separately from the main artist
    pub remixer: Option<String>,
}

impl ReleaseCandidate {
    /// Convert into the authoritative record shape.
    pub fn into_record(self, source: SourceName, confidence: f32) -> MetadataRecord {
        MetadataRecord {
            artist: self.artist,
            album_title: self.title,
            year: self.year,
            label: self.label,
            catalog_number: self.catalog_number,
            genre: self.genre,
            source_id: Some(self.source_id),
            confidence,
            source_name: source,
            remixer: self.remixer,
        }
    }
}

/// Errors that can occur during enrichment.
///
/// None of these are fatal to an album: the pipeline falls back to
/// local-tag metadata.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnrichmentError {
    #[error("{catalog} did not answer within {after_ms} ms")]
    Timeout { catalog: SourceName, after_ms: u64 },

    #[error("{catalog} returned HTTP {status}")]
    Http { catalog: SourceName, status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by {0} - try again later")]
    RateLimited(SourceName),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No matching release found")]
    NoMatch,

    #[error("Metadata cache error: {0}")]
    Cache(String),
}

impl From<crate::db::cache::CacheError> for EnrichmentError {
    fn from(e: crate::db::cache::CacheError) -> Self {
        Self::Cache(e.to_string())
    }
}

impl From<sqlx::Error> for EnrichmentError {
    fn from(e: sqlx::Error) -> Self {
        Self::Cache(e.to_string())
    }
}
