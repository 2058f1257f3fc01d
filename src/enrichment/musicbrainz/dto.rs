//! Wire shapes of the MusicBrainz release search response.
//!
//! Only fields present in the response belong here. The adapter converts
//! them into [`crate::enrichment::ReleaseCandidate`]s; nothing outside this
//! module should see them.
//!
//! API Reference: https://musicbrainz.org/doc/MusicBrainz_API/Search
//!
//! We use the /release search endpoint with a Lucene query built from the
//! album title and artist.

use serde::{Deserialize, Serialize};

/// Release search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseSearchResponse {
    /// Total number of hits (not just this page)
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub releases: Vec<Release>,
}

/// One release hit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Release {
    /// MusicBrainz release ID
    pub id: String,
    /// Search relevance (0-100), MusicBrainz's own notion, not ours
    pub score: Option<u32>,
    pub title: String,
    /// Release status (Official, Bootleg, Promotion, etc.)
    pub status: Option<String>,
    /// Release date (YYYY, YYYY-MM, or YYYY-MM-DD)
    pub date: Option<String>,
    #[serde(default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub label_info: Vec<LabelInfo>,
    pub release_group: Option<ReleaseGroup>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Artist credit (can be multiple for collaborations)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistCredit {
    /// How this artist is credited (may differ from official name)
    pub name: Option<String>,
    /// Join phrase (e.g., " & ", " feat. ")
    pub joinphrase: Option<String>,
    pub artist: Artist,
}

/// Artist info
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub sort_name: Option<String>,
}

/// Label and catalog number of a release
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LabelInfo {
    pub catalog_number: Option<String>,
    pub label: Option<Label>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Label {
    pub id: Option<String>,
    pub name: String,
}

/// Release group (groups the same album across editions)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseGroup {
    pub id: String,
    /// Primary type (Album, Single, EP, etc.)
    pub primary_type: Option<String>,
    /// Secondary types (Compilation, Remix, Live, etc.)
    #[serde(default)]
    pub secondary_types: Vec<String>,
}

/// Folksonomy tag
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub count: i32,
}

/// Error response from MusicBrainz API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: String,
    pub help: Option<String>,
}

// ============================================================================
// Response samples trimmed from real search results
// ============================================================================

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_empty_search() {
        let json = r#"{"created": "2024-01-01T00:00:00.000Z", "count": 0, "offset": 0, "releases": []}"#;
        let response: ReleaseSearchResponse = serde_json::from_str(json).expect("Should parse empty search");
        assert_eq!(response.count, 0);
        assert!(response.releases.is_empty());
    }

    #[test]
    fn test_parse_release_hit() {
        let json = r#"{
            "count": 1,
            "releases": [{
                "id": "rel-1",
                "score": 100,
                "title": "Selected Ambient Works 85-92",
                "status": "Official",
                "date": "1992-11-09",
                "artist-credit": [{
                    "name": "Aphex Twin",
                    "artist": {"id": "art-1", "name": "Aphex Twin", "sort-name": "Aphex Twin"}
                }],
                "label-info": [{
                    "catalog-number": "AMB 3922",
                    "label": {"id": "lab-1", "name": "Apollo"}
                }],
                "release-group": {
                    "id": "rg-1",
                    "primary-type": "Album",
                    "secondary-types": ["Compilation"]
                },
                "tags": [{"count": 3, "name": "ambient techno"}]
            }]
        }"#;

        let response: ReleaseSearchResponse = serde_json::from_str(json).expect("Should parse release hit");
        let release = &response.releases[0];
        assert_eq!(release.score, Some(100));
        assert_eq!(release.artist_credit[0].artist.name, "Aphex Twin");
        assert_eq!(release.label_info[0].catalog_number.as_deref(), Some("AMB 3922"));
        assert_eq!(release.label_info[0].label.as_ref().unwrap().name, "Apollo");
        let rg = release.release_group.as_ref().unwrap();
        assert_eq!(rg.secondary_types, vec!["Compilation".to_string()]);
        assert_eq!(release.tags[0].name, "ambient techno");
    }

    #[test]
    fn test_parse_release_without_optional_blocks() {
        let json = r#"{"releases": [{"id": "rel-2", "title": "Untitled"}]}"#;
        let response: ReleaseSearchResponse = serde_json::from_str(json).unwrap();
        let release = &response.releases[0];
        assert!(release.label_info.is_empty());
        assert!(release.release_group.is_none());
        assert!(release.date.is_none());
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{
            "error": "Invalid query",
            "help": "For usage, please see: https://musicbrainz.org/development/mmd"
        }"#;

        let error: ApiError = serde_json::from_str(json).expect("Should parse error");
        assert_eq!(error.error, "Invalid query");
        assert!(error.help.is_some());
    }
}
