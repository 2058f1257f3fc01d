//! Trait definitions for external catalog clients.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the real client implementations, while tests
//! can substitute mock implementations.
//!
//! # Example
//!
//! ```ignore
//! use album_organizer::enrichment::traits::CatalogSource;
//!
//! async fn lookup(source: &dyn CatalogSource, query: &ReleaseQuery) {
//!     let candidates = source.search_release(query).await?;
//! }
//! ```

use async_trait::async_trait;

use super::domain::{EnrichmentError, ReleaseCandidate, ReleaseQuery};
use crate::model::SourceName;

/// A searchable catalog of releases.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Which source this is; selects the rate-limit bucket and tie-break priority.
    fn name(&self) -> SourceName;

    /// Search for releases matching the query, unscored.
    async fn search_release(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, EnrichmentError>;
}

#[async_trait]
impl CatalogSource for super::musicbrainz::MusicBrainzClient {
    fn name(&self) -> SourceName {
        SourceName::MusicBrainz
    }

    async fn search_release(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, EnrichmentError> {
        self.search_release(query).await
    }
}

#[async_trait]
impl CatalogSource for super::discogs::DiscogsClient {
    fn name(&self) -> SourceName {
        SourceName::Discogs
    }

    async fn search_release(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, EnrichmentError> {
        self.search_release(query).await
    }
}
