//! Discogs HTTP client
//!
//! Database search requires authentication; a personal access token is sent
//! as `Authorization: Discogs token=...`.

use super::{adapter, dto};
use crate::enrichment::domain::{EnrichmentError, ReleaseCandidate, ReleaseQuery};
use crate::model::SourceName;

const DEFAULT_BASE_URL: &str = "https://api.discogs.com";

const PER_PAGE: u32 = 10;

/// Discogs API client
pub struct DiscogsClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
}

impl DiscogsClient {
    pub fn new(user_agent: &str, token: impl Into<String>) -> Result<Self, EnrichmentError> {
        Self::with_base_url(user_agent, token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        user_agent: &str,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, EnrichmentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Search releases by title and artist
    pub async fn search_release(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, EnrichmentError> {
        let mut url = format!(
            "{}/database/search?type=release&release_title={}&per_page={}",
            self.base_url,
            urlencoding::encode(&query.title),
            PER_PAGE
        );
        if !query.artist.trim().is_empty() {
            url.push_str(&format!("&artist={}", urlencoding::encode(&query.artist)));
        }
        tracing::debug!(target: "enrichment::discogs", %url, "Searching releases");

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Discogs token={}", self.token))
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EnrichmentError::RateLimited(SourceName::Discogs));
        }

        if !status.is_success() {
            if let Ok(error) = response.json::<dto::ApiError>().await {
                tracing::debug!(target: "enrichment::discogs", message = %error.message, "API error");
            }
            return Err(EnrichmentError::Http {
                catalog: SourceName::Discogs,
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<dto::SearchResponse>()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))?;

        Ok(adapter::to_candidates(body))
    }
}
