//! Adapter layer: Convert MusicBrainz DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! This isolates API changes - if MusicBrainz changes their response format,
//! only this file and dto.rs need to change.

use super::dto;
use crate::enrichment::domain::ReleaseCandidate;

/// Convert a search response into unscored candidates.
pub fn to_candidates(response: dto::ReleaseSearchResponse) -> Vec<ReleaseCandidate> {
    response.releases.into_iter().map(to_candidate).collect()
}

fn to_candidate(release: dto::Release) -> ReleaseCandidate {
    let (artist, remixer) = build_artist_string(&release.artist_credit);
    let (label, catalog_number) = first_label(&release.label_info);

    ReleaseCandidate {
        source_id: release.id,
        artist,
        title: Some(release.title),
        year: release.date.as_deref().and_then(parse_year),
        label,
        catalog_number,
        genre: top_tag(&release.tags),
        remixer,
    }
}

/// Build a combined artist string from artist credits.
///
/// A credit that follows a join phrase mentioning "remix" is also returned
/// as the remixer.
fn build_artist_string(credits: &[dto::ArtistCredit]) -> (Option<String>, Option<String>) {
    if credits.is_empty() {
        return (None, None);
    }

    let mut result = String::new();
    let mut remixer = None;
    let mut previous_join: Option<&str> = None;
    for credit in credits {
        // Use credited name if available, otherwise official name
        let name = credit.name.as_ref().unwrap_or(&credit.artist.name);
        if previous_join.is_some_and(|j| j.to_lowercase().contains("remix")) && remixer.is_none() {
            remixer = Some(name.clone());
        }
        result.push_str(name);

        if let Some(ref join) = credit.joinphrase {
            result.push_str(join);
        }
        previous_join = credit.joinphrase.as_deref();
    }

    (Some(result.trim().to_string()), remixer)
}

fn first_label(info: &[dto::LabelInfo]) -> (Option<String>, Option<String>) {
    let label = info.iter().find_map(|i| i.label.as_ref()).map(|l| l.name.clone());
    let catalog = info
        .iter()
        .filter_map(|i| i.catalog_number.as_deref())
        .find(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case("[none]"))
        .map(str::to_string);
    (label, catalog)
}

/// Most-voted tag, ties broken by name.
fn top_tag(tags: &[dto::Tag]) -> Option<String> {
    tags.iter()
        .max_by(|a, b| a.count.cmp(&b.count).then_with(|| b.name.cmp(&a.name)))
        .map(|t| t.name.clone())
}

/// Year from "YYYY", "YYYY-MM" or "YYYY-MM-DD".
pub(crate) fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(name: &str, join: Option<&str>) -> dto::ArtistCredit {
        dto::ArtistCredit {
            name: None,
            joinphrase: join.map(str::to_string),
            artist: dto::Artist {
                id: format!("{name}-id"),
                name: name.to_string(),
                sort_name: None,
            },
        }
    }

    fn release(id: &str) -> dto::Release {
        dto::Release {
            id: id.to_string(),
            score: Some(100),
            title: "Title".to_string(),
            status: Some("Official".to_string()),
            date: Some("1999-05".to_string()),
            artist_credit: vec![credit("Artist", None)],
            label_info: vec![],
            release_group: None,
            tags: vec![],
        }
    }

    #[test]
    fn test_convert_minimal_release() {
        let candidate = to_candidate(release("r1"));
        assert_eq!(candidate.source_id, "r1");
        assert_eq!(candidate.artist.as_deref(), Some("Artist"));
        assert_eq!(candidate.year, Some(1999));
        assert!(candidate.label.is_none());
    }

    #[test]
    fn test_build_collaboration_artist() {
        let credits = vec![credit("Queen", Some(" & ")), credit("David Bowie", None)];
        let (artist, remixer) = build_artist_string(&credits);
        assert_eq!(artist.as_deref(), Some("Queen & David Bowie"));
        assert!(remixer.is_none());
    }

    #[test]
    fn test_remixer_from_join_phrase() {
        let credits = vec![credit("Björk", Some(" remixed by ")), credit("Matthew Herbert", None)];
        let (_, remixer) = build_artist_string(&credits);
        assert_eq!(remixer.as_deref(), Some("Matthew Herbert"));
    }

    #[test]
    fn test_label_skips_none_catalog() {
        let info = vec![
            dto::LabelInfo {
                catalog_number: Some("[none]".to_string()),
                label: Some(dto::Label { id: None, name: "Warp".to_string() }),
            },
            dto::LabelInfo {
                catalog_number: Some("WARP92".to_string()),
                label: None,
            },
        ];
        assert_eq!(
            first_label(&info),
            (Some("Warp".to_string()), Some("WARP92".to_string()))
        );
    }

    #[test]
    fn test_extract_year_from_date() {
        assert_eq!(parse_year("1975-10-31"), Some(1975));
        assert_eq!(parse_year("1975"), Some(1975));
        assert_eq!(parse_year("19"), None);
        assert_eq!(parse_year("abcd"), None);
    }

    #[test]
    fn test_top_tag() {
        let tags = vec![
            dto::Tag { name: "techno".into(), count: 2 },
            dto::Tag { name: "ambient".into(), count: 5 },
        ];
        assert_eq!(top_tag(&tags).as_deref(), Some("ambient"));
    }
}
