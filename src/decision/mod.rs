//! Organization decisions: which mode an album is filed under, and where.
//!
//! The [`DecisionEngine`] runs the ordered rule chain from [`rules`] and
//! renders the chosen mode's [`PathTemplate`]. Anything that cannot be
//! rendered unambiguously lands in `{destination}/Unsorted/{directory name}`.
//!
//! # Example
//!
//! ```ignore
//! let engine = DecisionEngine::new(config.decision.clone(), "/music/library");
//! let routing = engine.decide(&DecisionInput {
//!     album_name: "Unknown Artist - Untitled A1",
//!     quality: QualityClass::Lossless,
//!     record: &record,
//!     counts: ReleaseCounts::default(),
//! });
//! ```

pub mod rules;
pub mod template;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::DecisionConfig;
use crate::db::albums::ReleaseCounts;
use crate::enrichment::passes_threshold;
use crate::model::{MetadataRecord, OrganizationDecision, OrganizationMode, QualityClass, RuleHit, RuleTrace};
use rules::{Rule, RuleContext, RuleOutcome};

pub use template::{DecisionAmbiguityError, PathTemplate, Placeholder, sanitize_filename};

/// Directory under the destination root for albums that cannot be placed.
pub const UNSORTED_DIR: &str = "Unsorted";

/// What the engine needs to know about one album.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    /// Source directory name, used for the unsorted fallback
    pub album_name: &'a str,
    pub quality: QualityClass,
    /// The authoritative record (after confidence gating)
    pub record: &'a MetadataRecord,
    /// Organized releases already on file for this artist/label/series
    pub counts: ReleaseCounts,
}

/// Outcome of a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    Organized(OrganizationDecision),
    /// No usable destination could be rendered
    Unsorted {
        destination_path: PathBuf,
        reason: String,
        rule_trace: RuleTrace,
    },
}

impl Routing {
    pub fn destination_path(&self) -> &Path {
        match self {
            Self::Organized(d) => &d.destination_path,
            Self::Unsorted { destination_path, .. } => destination_path,
        }
    }

    pub fn rule_trace(&self) -> &RuleTrace {
        match self {
            Self::Organized(d) => &d.rule_trace,
            Self::Unsorted { rule_trace, .. } => rule_trace,
        }
    }

    /// The mode, or `None` for unsorted albums.
    pub fn mode(&self) -> Option<OrganizationMode> {
        match self {
            Self::Organized(d) => Some(d.mode),
            Self::Unsorted { .. } => None,
        }
    }

    /// Mode name as stored in the albums table.
    pub fn mode_name(&self) -> &'static str {
        self.mode().map_or("unsorted", |m| m.as_str())
    }
}

/// Pick the record the decision is based on: the catalog match when it is
/// confident enough (gaps filled from local tags), otherwise local tags.
pub fn select_record(local: &MetadataRecord, enriched: Option<MetadataRecord>, threshold: f32) -> MetadataRecord {
    match enriched {
        Some(mut record) if passes_threshold(&record, threshold) => {
            record.fill_missing_from(local);
            record
        }
        Some(record) => {
            tracing::debug!(
                target: "decision",
                confidence = record.confidence,
                threshold,
                "Catalog match below threshold, keeping local tags"
            );
            local.clone()
        }
        None => local.clone(),
    }
}

/// Chooses a mode and renders the destination path for an album.
pub struct DecisionEngine {
    config: DecisionConfig,
    destination: PathBuf,
    rules: Vec<Box<dyn Rule>>,
    templates: HashMap<OrganizationMode, Result<PathTemplate, DecisionAmbiguityError>>,
    forced_mode: Option<OrganizationMode>,
}

impl fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("destination", &self.destination)
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("forced_mode", &self.forced_mode)
            .finish()
    }
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, destination: impl Into<PathBuf>) -> Self {
        let templates = OrganizationMode::ALL
            .into_iter()
            .map(|mode| (mode, PathTemplate::parse(config.templates.for_mode(mode))))
            .collect();
        Self {
            rules: rules::default_chain(config.electronic),
            config,
            destination: destination.into(),
            templates,
            forced_mode: None,
        }
    }

    /// Skip the rule chain and file every album under `mode`.
    pub fn with_forced_mode(mut self, mode: Option<OrganizationMode>) -> Self {
        self.forced_mode = mode;
        self
    }

    /// Templates that failed to parse. Albums routed to these modes go to
    /// the unsorted bucket.
    pub fn template_errors(&self) -> Vec<(OrganizationMode, DecisionAmbiguityError)> {
        OrganizationMode::ALL
            .into_iter()
            .filter_map(|mode| match self.templates.get(&mode) {
                Some(Err(e)) => Some((mode, e.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn decide(&self, input: &DecisionInput<'_>) -> Routing {
        let mut trace = RuleTrace::new();
        let mode = match self.forced_mode {
            Some(mode) => {
                trace.push(RuleHit {
                    rule: "forced",
                    outcome: mode.to_string(),
                });
                mode
            }
            None => self.run_rules(input, &mut trace),
        };

        let template = match self.templates.get(&mode) {
            Some(Ok(t)) => t,
            Some(Err(e)) => return self.unsorted(input.album_name, e, trace),
            None => return self.unsorted(input.album_name, format!("no template for {mode}"), trace),
        };

        match template.render(&self.placeholder_values(input)) {
            Ok(relative) => Routing::Organized(OrganizationDecision {
                mode,
                destination_path: self.destination.join(relative),
                rule_trace: trace,
            }),
            Err(e) => self.unsorted(input.album_name, e, trace),
        }
    }

    /// Route an album to the unsorted bucket.
    pub fn unsorted(&self, album_name: &str, reason: impl fmt::Display, mut rule_trace: RuleTrace) -> Routing {
        let reason = reason.to_string();
        rule_trace.push(RuleHit {
            rule: "unsorted",
            outcome: reason.clone(),
        });
        Routing::Unsorted {
            destination_path: self.unsorted_path(album_name),
            reason,
            rule_trace,
        }
    }

    /// `{destination}/Unsorted/{sanitized directory name}`
    pub fn unsorted_path(&self, album_name: &str) -> PathBuf {
        let name = sanitize_filename(album_name.trim());
        let name = if matches!(name.as_str(), "" | "." | "..") {
            "album".to_string()
        } else {
            name
        };
        self.destination.join(UNSORTED_DIR).join(name)
    }

    fn run_rules(&self, input: &DecisionInput<'_>, trace: &mut RuleTrace) -> OrganizationMode {
        let ctx = RuleContext {
            record: input.record,
            counts: input.counts,
            config: &self.config,
        };
        for rule in &self.rules {
            match rule.evaluate(&ctx) {
                RuleOutcome::Match { mode, detail } => {
                    trace.push(RuleHit {
                        rule: rule.name(),
                        outcome: format!("{detail} => {mode}"),
                    });
                    return mode;
                }
                RuleOutcome::NoMatch(detail) => trace.push(RuleHit {
                    rule: rule.name(),
                    outcome: detail,
                }),
            }
        }
        OrganizationMode::Artist
    }

    fn placeholder_values(&self, input: &DecisionInput<'_>) -> HashMap<Placeholder, String> {
        let record = input.record;
        let mut values = HashMap::new();
        values.insert(Placeholder::Quality, input.quality.as_str().to_string());

        let text_fields = [
            (Placeholder::Artist, &record.artist),
            (Placeholder::Album, &record.album_title),
            (Placeholder::Label, &record.label),
            (Placeholder::Catalog, &record.catalog_number),
            (Placeholder::Genre, &record.genre),
        ];
        for (placeholder, value) in text_fields {
            if let Some(v) = value {
                values.insert(placeholder, v.clone());
            }
        }
        if let Some(year) = record.year {
            values.insert(Placeholder::Year, year.to_string());
        }
        if let Some(remixer) = rules::remixer_for(record, &self.config.remix_keywords) {
            values.insert(Placeholder::Remixer, remixer);
        }
        if let Some(series) = rules::series_name(record, input.counts, &self.config) {
            values.insert(Placeholder::Series, series);
        }
        values
    }
}
