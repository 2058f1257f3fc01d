//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz web service.
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits to
//! 1 req/sec. The limit is enforced by the shared token bucket, not here.

use super::{adapter, dto};
use crate::enrichment::domain::{EnrichmentError, ReleaseCandidate, ReleaseQuery};
use crate::model::SourceName;

const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";

/// Maximum hits requested per search
const SEARCH_LIMIT: u32 = 10;

/// MusicBrainz API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl MusicBrainzClient {
    /// Create a new client
    pub fn new(user_agent: &str) -> Result<Self, EnrichmentError> {
        Self::with_base_url(user_agent, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL (mirrors, tests)
    pub fn with_base_url(user_agent: &str, base_url: impl Into<String>) -> Result<Self, EnrichmentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    /// Search releases by title and artist
    pub async fn search_release(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, EnrichmentError> {
        let response = self.send_search_request(query).await?;
        Ok(adapter::to_candidates(response))
    }

    /// Send the HTTP request and parse the response
    async fn send_search_request(&self, query: &ReleaseQuery) -> Result<dto::ReleaseSearchResponse, EnrichmentError> {
        let url = format!(
            "{}/release/?query={}&fmt=json&limit={}",
            self.base_url,
            urlencoding::encode(&lucene_query(query)),
            SEARCH_LIMIT
        );
        tracing::debug!(target: "enrichment::musicbrainz", %url, "Searching releases");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();

        // MusicBrainz answers 503 when the per-IP limit is exceeded
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(EnrichmentError::RateLimited(SourceName::MusicBrainz));
        }

        if !status.is_success() {
            if let Ok(error) = response.json::<dto::ApiError>().await {
                tracing::debug!(target: "enrichment::musicbrainz", error = %error.error, "API error");
            }
            return Err(EnrichmentError::Http {
                catalog: SourceName::MusicBrainz,
                status: status.as_u16(),
            });
        }

        response
            .json::<dto::ReleaseSearchResponse>()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))
    }
}

/// Lucene query for the release search endpoint.
fn lucene_query(query: &ReleaseQuery) -> String {
    let mut q = format!("release:\"{}\"", escape(&query.title));
    if !query.artist.trim().is_empty() {
        q.push_str(&format!(" AND artist:\"{}\"", escape(&query.artist)));
    }
    q
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
