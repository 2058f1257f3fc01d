//! The ordered rule chain behind an organization decision.
//!
//! Each rule either settles the mode or passes. The first rule that settles
//! wins; every rule consulted leaves a [`RuleHit`] in the trace.

use crate::config::DecisionConfig;
use crate::db::albums::ReleaseCounts;
use crate::model::text::{catalog_prefix, contains_keyword_prefix, contains_phrase, is_placeholder_artist, normalize};
use crate::model::{MetadataRecord, OrganizationMode};

/// Bracketed title groups longer than this are never searched for a remixer.
pub const MAX_REMIX_GROUP_LEN: usize = 120;

/// Words that describe a version rather than name a remixer.
const VERSION_WORDS: &[&str] = &[
    "original", "extended", "radio", "club", "album", "vocal", "instrumental", "dub", "the", "a",
];

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub record: &'a MetadataRecord,
    pub counts: ReleaseCounts,
    pub config: &'a DecisionConfig,
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The rule settles the mode
    Match { mode: OrganizationMode, detail: String },
    /// The rule does not apply; the detail says why
    NoMatch(String),
}

impl RuleOutcome {
    fn matched(mode: OrganizationMode, detail: impl Into<String>) -> Self {
        Self::Match {
            mode,
            detail: detail.into(),
        }
    }

    fn pass(detail: impl Into<String>) -> Self {
        Self::NoMatch(detail.into())
    }
}

/// One predicate in the chain.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome;
}

/// The chain for the configured collection type.
///
/// Without electronic mode only compilation detection and the artist default
/// apply.
pub fn default_chain(electronic: bool) -> Vec<Box<dyn Rule>> {
    if electronic {
        vec![
            Box::new(SeriesRule { detect_series: true }),
            Box::new(UndergroundRule),
            Box::new(RemixRule),
            Box::new(LabelVsArtistRule),
            Box::new(DefaultRule),
        ]
    } else {
        vec![Box::new(SeriesRule { detect_series: false }), Box::new(DefaultRule)]
    }
}

// ============================================================================
// Series / compilation
// ============================================================================

pub struct SeriesRule {
    pub detect_series: bool,
}

impl Rule for SeriesRule {
    fn name(&self) -> &'static str {
        "series"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let record = ctx.record;
        let title = record.album_title.as_deref().unwrap_or_default();

        if is_various_artists(record.artist.as_deref(), &ctx.config.various_artists_aliases)
            && let Some(keyword) = ctx
                .config
                .compilation_keywords
                .iter()
                .find(|k| contains_phrase(title, k))
        {
            return RuleOutcome::matched(
                OrganizationMode::Compilation,
                format!("various artists with \"{keyword}\""),
            );
        }

        if !self.detect_series {
            return RuleOutcome::pass("not a compilation");
        }

        match series_name(record, ctx.counts, ctx.config) {
            Some(name) => RuleOutcome::matched(OrganizationMode::Series, format!("series {name}")),
            None => RuleOutcome::pass("no catalog series"),
        }
    }
}

/// True when the artist is one of the configured "various artists" aliases.
pub fn is_various_artists(artist: Option<&str>, aliases: &[String]) -> bool {
    let Some(artist) = artist.map(normalize) else {
        return false;
    };
    aliases.iter().any(|a| normalize(a) == artist)
}

/// Name of the catalog series this release belongs to, if any.
///
/// Configured patterns win; otherwise a "letters + digits" catalog number
/// whose label and prefix already have `series_min_releases` organized
/// releases forms an implicit series named after the prefix.
pub fn series_name(record: &MetadataRecord, counts: ReleaseCounts, config: &DecisionConfig) -> Option<String> {
    let catalog = record.catalog_number.as_deref()?;
    let label = record.label.as_deref().map(normalize).unwrap_or_default();
    let compact_catalog = normalize(catalog).replace(' ', "");

    let configured = config.series_patterns.iter().find(|p| {
        let pattern_label = normalize(&p.label);
        let prefix = normalize(&p.catalog_prefix).replace(' ', "");
        !pattern_label.is_empty()
            && !prefix.is_empty()
            && label.contains(&pattern_label)
            && compact_catalog.starts_with(&prefix)
    });
    if let Some(pattern) = configured {
        return Some(pattern.name.clone());
    }

    let prefix = catalog_prefix(catalog)?;
    (!label.is_empty() && counts.series >= config.series_min_releases).then(|| prefix.to_uppercase())
}

// ============================================================================
// Underground
// ============================================================================

pub struct UndergroundRule;

impl Rule for UndergroundRule {
    fn name(&self) -> &'static str {
        "underground"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let record = ctx.record;
        // Compilations carry no artist of their own but are not anonymous
        let various = is_various_artists(record.artist.as_deref(), &ctx.config.various_artists_aliases);
        if !various && is_placeholder_artist(record.artist.as_deref()) {
            return RuleOutcome::matched(OrganizationMode::Underground, "placeholder artist");
        }

        let text_fields = [
            ("artist", record.artist.as_deref()),
            ("title", record.album_title.as_deref()),
            ("label", record.label.as_deref()),
        ];
        for keyword in &ctx.config.underground_keywords {
            for (field, value) in text_fields {
                if value.is_some_and(|v| contains_phrase(v, keyword)) {
                    return RuleOutcome::matched(
                        OrganizationMode::Underground,
                        format!("\"{keyword}\" in {field}"),
                    );
                }
            }
        }

        // Bare tokens like "white" are band names in an artist or title
        for token in &ctx.config.underground_label_tokens {
            if record.label.as_deref().is_some_and(|l| contains_phrase(l, token)) {
                return RuleOutcome::matched(OrganizationMode::Underground, format!("\"{token}\" in label"));
            }
            if record
                .catalog_number
                .as_deref()
                .is_some_and(|c| contains_keyword_prefix(c, token))
            {
                return RuleOutcome::matched(
                    OrganizationMode::Underground,
                    format!("\"{token}\" in catalog number"),
                );
            }
        }
        RuleOutcome::pass("no underground markers")
    }
}

// ============================================================================
// Remix
// ============================================================================

pub struct RemixRule;

impl Rule for RemixRule {
    fn name(&self) -> &'static str {
        "remix"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let title = ctx.record.album_title.as_deref().unwrap_or_default();
        let has_keyword = ctx.config.remix_keywords.iter().any(|k| contains_phrase(title, k));
        let credited = distinct_remixer(ctx.record);

        if !has_keyword && credited.is_none() {
            return RuleOutcome::pass("no remix keyword");
        }

        match remixer_for(ctx.record, &ctx.config.remix_keywords) {
            Some(remixer) => RuleOutcome::matched(OrganizationMode::Remix, format!("remixer {remixer}")),
            None => RuleOutcome::matched(OrganizationMode::Artist, "no remixer"),
        }
    }
}

/// Catalog-credited remixer that differs from the main artist.
fn distinct_remixer(record: &MetadataRecord) -> Option<&str> {
    let remixer = record.remixer.as_deref()?.trim();
    let artist = record.artist.as_deref().map(normalize).unwrap_or_default();
    (!remixer.is_empty() && normalize(remixer) != artist).then_some(remixer)
}

/// Remixer for a release: the catalog credit, else the title's brackets.
pub fn remixer_for(record: &MetadataRecord, keywords: &[String]) -> Option<String> {
    if let Some(remixer) = distinct_remixer(record) {
        return Some(remixer.to_string());
    }
    extract_remixer(record.album_title.as_deref()?, keywords)
}

/// Remixer named in the last bracketed group that contains a remix keyword:
/// `"Track (Aphex Twin Remix)"` gives `"Aphex Twin"`.
pub fn extract_remixer(title: &str, keywords: &[String]) -> Option<String> {
    let group = bracket_groups(title)
        .into_iter()
        .rev()
        .filter(|g| g.chars().count() <= MAX_REMIX_GROUP_LEN)
        .find(|g| keywords.iter().any(|k| contains_phrase(g, k)))?;

    let words: Vec<&str> = group.split_whitespace().collect();
    let keyword_at = words.iter().rposition(|w| {
        let w = normalize(w);
        keywords.iter().any(|k| normalize(k).split(' ').next() == Some(w.as_str()))
    })?;

    let name = words[..keyword_at].join(" ");
    let name = name
        .trim_end_matches("'s")
        .trim_end_matches("\u{2019}s")
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == ',');
    let normalized = normalize(name);
    if normalized.is_empty() || normalized.split(' ').all(|w| VERSION_WORDS.contains(&w)) {
        return None;
    }
    Some(name.to_string())
}

/// Contents of top-level `(...)` and `[...]` groups, in order.
fn bracket_groups(s: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut open: Option<(char, usize)> = None;
    for (i, c) in s.char_indices() {
        match (c, open) {
            ('(' | '[', None) => open = Some((c, i + c.len_utf8())),
            (')', Some(('(', start))) | (']', Some(('[', start))) => {
                groups.push(&s[start..i]);
                open = None;
            }
            _ => {}
        }
    }
    groups
}

// ============================================================================
// Label vs artist
// ============================================================================

pub struct LabelVsArtistRule;

impl Rule for LabelVsArtistRule {
    fn name(&self) -> &'static str {
        "label_vs_artist"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let has_label = ctx.record.label.as_deref().is_some_and(|l| !l.trim().is_empty());
        if !has_label {
            return RuleOutcome::pass("no label");
        }
        let ReleaseCounts { label, artist, .. } = ctx.counts;
        let detail = format!("label {label} vs artist {artist}");
        if prefer_label(label, artist, ctx.config.min_label_releases) {
            RuleOutcome::matched(OrganizationMode::Label, detail)
        } else {
            RuleOutcome::matched(OrganizationMode::Artist, detail)
        }
    }
}

/// Label mode iff the label has at least `min` releases and either clearly
/// outnumbers the artist or the artist is sparse while the label is prolific.
pub fn prefer_label(label_count: i64, artist_count: i64, min: i64) -> bool {
    label_count >= min
        && (label_count > artist_count.saturating_mul(2) || (artist_count <= 2 && label_count >= 5))
}

// ============================================================================
// Default
// ============================================================================

pub struct DefaultRule;

impl Rule for DefaultRule {
    fn name(&self) -> &'static str {
        "default"
    }

    fn evaluate(&self, _ctx: &RuleContext<'_>) -> RuleOutcome {
        RuleOutcome::matched(OrganizationMode::Artist, "artist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeriesPattern;

    fn record(artist: Option<&str>, title: &str) -> MetadataRecord {
        MetadataRecord {
            artist: artist.map(str::to_string),
            album_title: Some(title.to_string()),
            ..MetadataRecord::local(0.3)
        }
    }

    fn eval(rule: &dyn Rule, record: &MetadataRecord, counts: ReleaseCounts) -> RuleOutcome {
        let config = DecisionConfig::default();
        rule.evaluate(&RuleContext {
            record,
            counts,
            config: &config,
        })
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_prefer_label_examples() {
        assert!(prefer_label(10, 2, 3));
        assert!(!prefer_label(4, 5, 3));
        // Sparse artist, prolific label
        assert!(prefer_label(5, 2, 3));
        // Below the minimum never wins
        assert!(!prefer_label(2, 0, 3));
    }

    #[test]
    fn test_compilation_needs_alias_and_keyword() {
        let rule = SeriesRule { detect_series: false };
        let comp = record(Some("Various Artists"), "Summer Compilation 2004");
        assert!(matches!(
            eval(&rule, &comp, ReleaseCounts::default()),
            RuleOutcome::Match { mode: OrganizationMode::Compilation, .. }
        ));

        let not_comp = record(Some("Various Artists"), "Summer 2004");
        assert!(matches!(eval(&rule, &not_comp, ReleaseCounts::default()), RuleOutcome::NoMatch(_)));
    }

    #[test]
    fn test_configured_series_pattern() {
        let mut config = DecisionConfig::default();
        config.series_patterns.push(SeriesPattern {
            name: "fabric".into(),
            label: "Fabric".into(),
            catalog_prefix: "FABRIC".into(),
        });
        let rec = MetadataRecord {
            label: Some("Fabric London".into()),
            catalog_number: Some("FABRIC 45".into()),
            ..record(Some("Ricardo Villalobos"), "Fabric 45")
        };
        assert_eq!(series_name(&rec, ReleaseCounts::default(), &config).as_deref(), Some("fabric"));
    }

    #[test]
    fn test_implicit_series_needs_history() {
        let config = DecisionConfig::default();
        let rec = MetadataRecord {
            label: Some("Kompakt".into()),
            catalog_number: Some("KOM123".into()),
            ..record(Some("Gas"), "Pop")
        };
        let few = ReleaseCounts { series: 2, ..Default::default() };
        let many = ReleaseCounts { series: 3, ..Default::default() };
        assert_eq!(series_name(&rec, few, &config), None);
        assert_eq!(series_name(&rec, many, &config).as_deref(), Some("KOM"));
    }

    #[test]
    fn test_underground_markers() {
        let placeholder = record(Some("Unknown Artist"), "Untitled A1");
        assert!(matches!(
            eval(&UndergroundRule, &placeholder, ReleaseCounts::default()),
            RuleOutcome::Match { mode: OrganizationMode::Underground, .. }
        ));

        let white = MetadataRecord {
            catalog_number: Some("WHITE001".into()),
            ..record(Some("Some Producer"), "Tool")
        };
        match eval(&UndergroundRule, &white, ReleaseCounts::default()) {
            RuleOutcome::Match { mode, detail } => {
                assert_eq!(mode, OrganizationMode::Underground);
                assert!(detail.contains("catalog"));
            }
            other => panic!("expected underground, got {other:?}"),
        }

        let plain = record(Some("Boards of Canada"), "Geogaddi");
        assert!(matches!(eval(&UndergroundRule, &plain, ReleaseCounts::default()), RuleOutcome::NoMatch(_)));

        let labelled = MetadataRecord {
            label: Some("White Label".into()),
            ..record(Some("Some Producer"), "Tool")
        };
        assert!(matches!(
            eval(&UndergroundRule, &labelled, ReleaseCounts::default()),
            RuleOutcome::Match { mode: OrganizationMode::Underground, .. }
        ));
    }

    #[test]
    fn test_bare_white_in_names_is_not_underground() {
        let cases = [
            record(Some("The White Stripes"), "Elephant"),
            record(Some("Barry White"), "Can't Get Enough"),
            record(Some("The Beatles"), "White Album"),
            record(Some("Promo Sapiens"), "Demo Tape"),
        ];
        for rec in &cases {
            assert!(
                matches!(eval(&UndergroundRule, rec, ReleaseCounts::default()), RuleOutcome::NoMatch(_)),
                "{:?} should not be underground",
                rec.artist
            );
        }

        let catalogued = MetadataRecord {
            label: Some("Wildlife Recordings".into()),
            catalog_number: Some("WLD001".into()),
            ..record(Some("Some Producer"), "Tool")
        };
        assert!(matches!(
            eval(&UndergroundRule, &catalogued, ReleaseCounts::default()),
            RuleOutcome::NoMatch(_)
        ));
    }

    #[test]
    fn test_various_artists_with_label_is_not_placeholder() {
        let rec = MetadataRecord {
            label: Some("Warp".into()),
            ..record(Some("Various Artists"), "Warp 10+1")
        };
        assert!(matches!(eval(&UndergroundRule, &rec, ReleaseCounts::default()), RuleOutcome::NoMatch(_)));

        let counts = ReleaseCounts { label: 10, ..Default::default() };
        assert!(matches!(
            eval(&LabelVsArtistRule, &rec, counts),
            RuleOutcome::Match { mode: OrganizationMode::Label, .. }
        ));
    }

    #[test]
    fn test_extract_remixer() {
        let keywords = kw(&["remix", "rmx", "mix"]);
        assert_eq!(
            extract_remixer("Windowlicker (Aphex Twin Remix)", &keywords).as_deref(),
            Some("Aphex Twin")
        );
        assert_eq!(
            extract_remixer("Song [Live] (Carl Craig's Mix)", &keywords).as_deref(),
            Some("Carl Craig")
        );
        // Last matching group wins
        assert_eq!(
            extract_remixer("A (B Remix) (C Remix)", &keywords).as_deref(),
            Some("C")
        );
        assert_eq!(extract_remixer("Song (Remix)", &keywords), None);
        assert_eq!(extract_remixer("Song (Original Mix)", &keywords), None);
        assert_eq!(extract_remixer("Song Remix", &keywords), None);
    }

    #[test]
    fn test_overlong_group_ignored() {
        let keywords = kw(&["remix"]);
        let long = format!("Song ({} Remix)", "x".repeat(MAX_REMIX_GROUP_LEN));
        assert_eq!(extract_remixer(&long, &keywords), None);
    }

    #[test]
    fn test_remix_without_remixer_falls_back_to_artist() {
        let rec = record(Some("Artist"), "The Remix Album");
        match eval(&RemixRule, &rec, ReleaseCounts::default()) {
            RuleOutcome::Match { mode, detail } => {
                assert_eq!(mode, OrganizationMode::Artist);
                assert_eq!(detail, "no remixer");
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_credited_remixer_triggers_remix() {
        let rec = MetadataRecord {
            remixer: Some("Luke Slater".into()),
            ..record(Some("Artist"), "Plain Title")
        };
        assert!(matches!(
            eval(&RemixRule, &rec, ReleaseCounts::default()),
            RuleOutcome::Match { mode: OrganizationMode::Remix, .. }
        ));

        // Same as the main artist is not a distinct remixer
        let same = MetadataRecord {
            remixer: Some("artist".into()),
            ..record(Some("Artist"), "Plain Title")
        };
        assert!(matches!(eval(&RemixRule, &same, ReleaseCounts::default()), RuleOutcome::NoMatch(_)));
    }

    #[test]
    fn test_label_rule_requires_label() {
        let rec = record(Some("Artist"), "Title");
        let counts = ReleaseCounts { label: 10, artist: 0, series: 0 };
        assert!(matches!(eval(&LabelVsArtistRule, &rec, counts), RuleOutcome::NoMatch(_)));

        let labelled = MetadataRecord {
            label: Some("Warp".into()),
            ..rec
        };
        assert!(matches!(
            eval(&LabelVsArtistRule, &labelled, counts),
            RuleOutcome::Match { mode: OrganizationMode::Label, .. }
        ));
    }
}
