//! Adapter layer: Convert Discogs DTOs to domain models

use super::dto;
use crate::enrichment::domain::ReleaseCandidate;
use crate::enrichment::musicbrainz::parse_year;

/// Convert search hits into unscored candidates. Masters and other
/// non-release hits are dropped.
pub fn to_candidates(response: dto::SearchResponse) -> Vec<ReleaseCandidate> {
    response
        .results
        .into_iter()
        .filter(|r| r.result_type.as_deref().is_none_or(|t| t == "release"))
        .map(to_candidate)
        .collect()
}

fn to_candidate(result: dto::SearchResult) -> ReleaseCandidate {
    let (artist, title) = split_title(&result.title);

    ReleaseCandidate {
        source_id: result.id.to_string(),
        artist,
        title: Some(title),
        year: result.year.as_ref().and_then(year),
        label: result.label.first().map(|l| strip_disambiguation(l)),
        catalog_number: result
            .catno
            .filter(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case("none")),
        // Styles are more specific than genres ("Ambient" vs "Electronic")
        genre: result.style.first().or(result.genre.first()).cloned(),
        remixer: None,
    }
}

fn year(y: &dto::Year) -> Option<i32> {
    match y {
        dto::Year::Number(n) if *n > 0 => Some(*n),
        dto::Year::Number(_) => None,
        dto::Year::Text(s) => parse_year(s),
    }
}

/// Discogs titles are "Artist - Title".
fn split_title(title: &str) -> (Option<String>, String) {
    match title.split_once(" - ") {
        Some((artist, rest)) => (Some(strip_disambiguation(artist)), rest.trim().to_string()),
        None => (None, title.trim().to_string()),
    }
}

/// Drop Discogs' numeric disambiguation suffix: "Label (2)" -> "Label".
fn strip_disambiguation(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(open) = trimmed.rfind(" (")
        && trimmed.ends_with(')')
        && open + 3 < trimmed.len()
        && trimmed[open + 2..trimmed.len() - 1].chars().all(|c| c.is_ascii_digit())
    {
        return trimmed[..open].to_string();
    }
    trimmed.to_string()
}
