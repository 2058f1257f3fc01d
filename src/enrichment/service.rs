//! Enrichment client - orchestrates cache, rate limits, catalog search and scoring
//!
//! This is the high-level API for enriching an album:
//! 1. Check the metadata cache (positive and negative entries)
//! 2. Acquire a token from each source's bucket and search, with a timeout
//! 3. Score every candidate against the local metadata and pick the best
//! 4. Cache the outcome, including "no match"

use futures::future::join_all;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use super::discogs::DiscogsClient;
use super::domain::{EnrichmentError, ReleaseCandidate, ReleaseQuery};
use super::musicbrainz::MusicBrainzClient;
use super::ratelimit::{RateLimit, RateLimiterRegistry};
use super::scoring::{MatchWeights, ScoredCandidate, pick_best, score};
use super::traits::CatalogSource;
use crate::config::EnrichmentConfig;
use crate::db::cache::{self, CachedLookup};
use crate::model::MetadataRecord;
use crate::model::text::is_placeholder_artist;

/// Tunables of the enrichment client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSettings {
    /// Per-request timeout
    pub timeout: Duration,
    /// How long cached results stay fresh
    pub cache_ttl: Duration,
    pub weights: MatchWeights,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(30 * 24 * 3600),
            weights: MatchWeights::default(),
        }
    }
}

/// Looks up authoritative release metadata. Cheap to clone; all workers
/// share the same buckets and cache.
#[derive(Clone)]
pub struct EnrichmentClient {
    sources: Vec<Arc<dyn CatalogSource>>,
    limiter: RateLimiterRegistry,
    pool: SqlitePool,
    settings: ClientSettings,
}

impl EnrichmentClient {
    pub fn new(
        sources: Vec<Arc<dyn CatalogSource>>,
        limiter: RateLimiterRegistry,
        pool: SqlitePool,
        settings: ClientSettings,
    ) -> Self {
        Self {
            sources,
            limiter,
            pool,
            settings,
        }
    }

    /// Build the client from configuration: MusicBrainz always, Discogs when
    /// enabled and a token is configured.
    pub fn from_config(config: &EnrichmentConfig, pool: SqlitePool) -> Result<Self, EnrichmentError> {
        let mut sources: Vec<Arc<dyn CatalogSource>> =
            vec![Arc::new(MusicBrainzClient::new(&config.user_agent)?)];
        let mut limiter = RateLimiterRegistry::new().with_source(
            crate::model::SourceName::MusicBrainz,
            RateLimit::per_interval(config.musicbrainz_interval_ms),
        );

        if config.discogs_enabled {
            match config.discogs_token.as_deref().filter(|t| !t.is_empty()) {
                Some(token) => {
                    sources.push(Arc::new(DiscogsClient::new(&config.user_agent, token)?));
                    limiter = limiter.with_source(
                        crate::model::SourceName::Discogs,
                        RateLimit::per_interval(config.discogs_interval_ms),
                    );
                }
                None => {
                    tracing::warn!(target: "enrichment", "Discogs enabled but no token configured; skipping it");
                }
            }
        }

        let settings = ClientSettings {
            timeout: Duration::from_secs(config.timeout_secs),
            cache_ttl: Duration::from_secs(config.cache_ttl_days * 24 * 3600),
            weights: config.weights,
        };
        Ok(Self::new(sources, limiter, pool, settings))
    }

    /// Find the best matching release.
    ///
    /// A blank or placeholder artist never triggers a remote call. Errors are
    /// never fatal to the album; callers fall back to local metadata.
    pub async fn enrich(&self, query: &ReleaseQuery) -> Result<MetadataRecord, EnrichmentError> {
        if is_placeholder_artist(Some(&query.artist)) {
            return Err(EnrichmentError::NoMatch);
        }

        let key = cache::cache_key(&query.artist, &query.title, query.year);
        match cache::get_cached(&self.pool, &key).await {
            Ok(CachedLookup::Hit(record)) => {
                tracing::debug!(target: "enrichment", %key, "Cache hit");
                return Ok(record);
            }
            Ok(CachedLookup::NoMatch) => {
                tracing::debug!(target: "enrichment", %key, "Cached no-match");
                return Err(EnrichmentError::NoMatch);
            }
            Ok(CachedLookup::Miss) => {}
            Err(e) => {
                tracing::warn!(target: "enrichment", %key, error = %e, "Cache lookup failed; querying sources");
            }
        }

        let results = join_all(self.sources.iter().map(|source| self.search_one(source.as_ref(), query))).await;

        let mut scored = Vec::new();
        let mut first_error = None;
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(candidates) => scored.extend(candidates.into_iter().filter_map(|candidate| {
                    let confidence = score(query, &candidate, &self.settings.weights);
                    (confidence > 0.0).then_some(ScoredCandidate {
                        source: source.name(),
                        confidence,
                        candidate,
                    })
                })),
                Err(e) => {
                    tracing::warn!(target: "enrichment", source = %source.name(), error = %e, "Catalog search failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match pick_best(scored) {
            Some(best) => {
                let record = best.candidate.into_record(best.source, best.confidence);
                self.store(&key, Some(&record)).await;
                Ok(record)
            }
            // A transient failure is not evidence of "no match"; leave it uncached
            None => match first_error {
                Some(e) => Err(e),
                None => {
                    self.store(&key, None).await;
                    Err(EnrichmentError::NoMatch)
                }
            },
        }
    }

    async fn search_one(
        &self,
        source: &dyn CatalogSource,
        query: &ReleaseQuery,
    ) -> Result<Vec<ReleaseCandidate>, EnrichmentError> {
        self.limiter.acquire(source.name()).await;
        match tokio::time::timeout(self.settings.timeout, source.search_release(query)).await {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Timeout {
                catalog: source.name(),
                after_ms: self.settings.timeout.as_millis() as u64,
            }),
        }
    }

    async fn store(&self, key: &str, record: Option<&MetadataRecord>) {
        if let Err(e) = cache::put_cached(&self.pool, key, record, self.settings.cache_ttl).await {
            tracing::warn!(target: "enrichment", %key, error = %e, "Failed to cache enrichment result");
        }
    }
}
