//! Discogs API Data Transfer Objects
//!
//! These types match what the Discogs database search returns.
//! DO NOT use these types outside the discogs module - convert to domain types.

use serde::{Deserialize, Serialize};

/// Database search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// One search hit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResult {
    /// Discogs release ID
    pub id: u64,
    /// Result type ("release", "master", ...)
    #[serde(rename = "type")]
    pub result_type: Option<String>,
    /// "Artist - Title"
    pub title: String,
    /// Release year; Discogs sends it as a string, occasionally as a number
    pub year: Option<Year>,
    /// Labels, first is the main one
    #[serde(default)]
    pub label: Vec<String>,
    pub catno: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub style: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Year {
    Number(i32),
    Text(String),
}

/// Error body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub message: String,
}

// ============================================================================
// CONTRACT TESTS
// ============================================================================
