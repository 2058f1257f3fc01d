//! Candidate scoring and selection.
//!
//! A candidate's confidence is a weighted sum of per-field similarities
//! against the local query. Weights are tunable but must sum to 1 and keep
//! the order title > artist > year > label, so every score is in `[0, 1]`
//! and scores are comparable across sources.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use super::domain::{ReleaseCandidate, ReleaseQuery};
use crate::model::text::tokens;
use crate::model::{MetadataRecord, SourceName};

/// Per-field weights of the match score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeights {
    pub title: f32,
    pub artist: f32,
    pub year: f32,
    pub label: f32,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            title: 0.4,
            artist: 0.3,
            year: 0.2,
            label: 0.1,
        }
    }
}

impl MatchWeights {
    /// Check the weights are non-negative, sum to 1 and are strictly ordered.
    pub fn validate(&self) -> Result<(), String> {
        let all = [self.title, self.artist, self.year, self.label];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("match weights must be finite and non-negative".to_string());
        }
        let sum: f32 = all.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("match weights must sum to 1.0, got {sum}"));
        }
        if !(self.title > self.artist && self.artist > self.year && self.year > self.label) {
            return Err("match weights must be ordered title > artist > year > label".to_string());
        }
        Ok(())
    }
}

/// Token-set Jaccard similarity of two strings after normalization.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let a: HashSet<String> = tokens(a).into_iter().collect();
    let b: HashSet<String> = tokens(b).into_iter().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let common = a.intersection(&b).count() as f32;
    let union = a.union(&b).count() as f32;
    common / union
}

/// Exact year = 1, one year apart = 0.5 (reissue/timezone drift), else 0.
pub fn year_similarity(a: i32, b: i32) -> f32 {
    match (a - b).abs() {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    }
}

fn optional_text(a: Option<&str>, b: Option<&str>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => text_similarity(a, b),
        _ => 0.0,
    }
}

/// Confidence of a candidate against the query. Fields absent on either
/// side contribute nothing.
pub fn score(query: &ReleaseQuery, candidate: &ReleaseCandidate, weights: &MatchWeights) -> f32 {
    let title = optional_text(Some(&query.title), candidate.title.as_deref());
    let artist = optional_text(Some(&query.artist), candidate.artist.as_deref());
    let year = match (query.year, candidate.year) {
        (Some(a), Some(b)) => year_similarity(a, b),
        _ => 0.0,
    };
    let label = optional_text(query.label.as_deref(), candidate.label.as_deref());

    let total = weights.title * title + weights.artist * artist + weights.year * year + weights.label * label;
    total.clamp(0.0, 1.0)
}

/// A candidate with its confidence and origin.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub source: SourceName,
    pub confidence: f32,
    pub candidate: ReleaseCandidate,
}

/// Deterministic ranking: higher confidence, then source priority, then the
/// lexicographically smaller source id.
fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.source.priority().cmp(&b.source.priority()))
        .then_with(|| a.candidate.source_id.cmp(&b.candidate.source_id))
}

/// Pick the best candidate. Input order does not affect the result.
pub fn pick_best(candidates: Vec<ScoredCandidate>) -> Option<ScoredCandidate> {
    candidates.into_iter().min_by(rank)
}

/// Keep only records whose confidence reaches `threshold`.
///
/// Raising the threshold can only remove records, never add them.
pub fn apply_threshold(records: Vec<MetadataRecord>, threshold: f32) -> Vec<MetadataRecord> {
    records
        .into_iter()
        .filter(|r| r.confidence >= threshold)
        .collect()
}

/// Whether a single record may be applied automatically.
pub fn passes_threshold(record: &MetadataRecord, threshold: f32) -> bool {
    record.confidence >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn query() -> ReleaseQuery {
        ReleaseQuery {
            artist: "Aphex Twin".into(),
            title: "Selected Ambient Works 85-92".into(),
            year: Some(1992),
            label: Some("Apollo".into()),
        }
    }

    fn candidate(id: &str, title: &str, artist: &str, year: Option<i32>) -> ReleaseCandidate {
        ReleaseCandidate {
            source_id: id.into(),
            title: Some(title.into()),
            artist: Some(artist.into()),
            year,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_weights_are_valid() {
        MatchWeights::default().validate().unwrap();
    }

    #[test]
    fn test_weights_validation() {
        let bad_sum = MatchWeights { title: 0.5, ..Default::default() };
        assert!(bad_sum.validate().is_err());

        let bad_order = MatchWeights { title: 0.3, artist: 0.4, year: 0.2, label: 0.1 };
        assert!(bad_order.validate().is_err());
    }

    #[test]
    fn test_exact_match_scores_one() {
        let c = ReleaseCandidate {
            label: Some("Apollo".into()),
            ..candidate("1", "Selected Ambient Works 85-92", "Aphex Twin", Some(1992))
        };
        let s = score(&query(), &c, &MatchWeights::default());
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_fields_score_zero() {
        let c = candidate("1", "Selected Ambient Works 85-92", "Aphex Twin", None);
        let s = score(&query(), &c, &MatchWeights::default());
        // title + artist only
        assert!((s - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_year_off_by_one_is_half() {
        assert_eq!(year_similarity(1992, 1993), 0.5);
        assert_eq!(year_similarity(1992, 1995), 0.0);
    }

    #[test]
    fn test_tie_break_prefers_musicbrainz_then_smaller_id() {
        let mk = |source, id: &str| ScoredCandidate {
            source,
            confidence: 0.8,
            candidate: candidate(id, "T", "A", None),
        };
        let best = pick_best(vec![
            mk(SourceName::Discogs, "1"),
            mk(SourceName::MusicBrainz, "b"),
            mk(SourceName::MusicBrainz, "a"),
        ])
        .unwrap();
        assert_eq!(best.source, SourceName::MusicBrainz);
        assert_eq!(best.candidate.source_id, "a");
    }

    #[test]
    fn test_higher_confidence_wins_over_priority() {
        let best = pick_best(vec![
            ScoredCandidate { source: SourceName::MusicBrainz, confidence: 0.5, candidate: candidate("m", "T", "A", None) },
            ScoredCandidate { source: SourceName::Discogs, confidence: 0.9, candidate: candidate("d", "T", "A", None) },
        ])
        .unwrap();
        assert_eq!(best.source, SourceName::Discogs);
    }

    proptest! {
        /// Raising the threshold never increases the number of applied records.
        #[test]
        fn confidence_gating_is_monotonic(
            confidences in prop::collection::vec(0.0f32..=1.0, 0..30),
            t1 in 0.0f32..=1.0,
            t2 in 0.0f32..=1.0,
        ) {
            let records: Vec<MetadataRecord> =
                confidences.iter().map(|c| MetadataRecord::local(*c)).collect();
            let (low, high) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            let applied_low = apply_threshold(records.clone(), low);
            let applied_high = apply_threshold(records, high);
            prop_assert!(applied_high.len() <= applied_low.len());
            prop_assert!(applied_high.iter().all(|r| r.confidence >= high));
        }

        /// Scores stay in [0, 1] for arbitrary text.
        #[test]
        fn score_is_bounded(title in ".{0,40}", artist in ".{0,40}", year in proptest::option::of(1950i32..2030)) {
            let c = ReleaseCandidate {
                source_id: "x".into(),
                title: Some(title),
                artist: Some(artist),
                year,
                ..Default::default()
            };
            let s = score(&query(), &c, &MatchWeights::default());
            prop_assert!((0.0..=1.0).contains(&s));
        }

        /// The winner does not depend on candidate order.
        #[test]
        fn pick_best_is_order_independent(confidences in prop::collection::vec(0.0f32..=1.0, 1..10)) {
            let candidates: Vec<ScoredCandidate> = confidences
                .iter()
                .enumerate()
                .map(|(i, c)| ScoredCandidate {
                    source: if i % 2 == 0 { SourceName::MusicBrainz } else { SourceName::Discogs },
                    confidence: *c,
                    candidate: candidate(&format!("{i:03}"), "T", "A", None),
                })
                .collect();
            let mut reversed = candidates.clone();
            reversed.reverse();
            prop_assert_eq!(pick_best(candidates), pick_best(reversed));
        }
    }
}
