//! Destination path templates.
//!
//! A template such as `{quality}/Labels/{label}/{artist} - {album}` is parsed
//! once into literal and placeholder segments, then rendered against a typed
//! value map. Rendering fails closed: a placeholder without a value is a
//! [`DecisionAmbiguityError`], never an empty path component.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Values a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Quality,
    Artist,
    Album,
    Label,
    Catalog,
    Year,
    Genre,
    Remixer,
    Series,
}

impl Placeholder {
    pub const ALL: [Placeholder; 9] = [
        Self::Quality,
        Self::Artist,
        Self::Album,
        Self::Label,
        Self::Catalog,
        Self::Year,
        Self::Genre,
        Self::Remixer,
        Self::Series,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Label => "label",
            Self::Catalog => "catalog",
            Self::Year => "year",
            Self::Genre => "genre",
            Self::Remixer => "remixer",
            Self::Series => "series",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

/// A destination path could not be determined unambiguously; the album is
/// routed to the unsorted bucket instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionAmbiguityError {
    #[error("Unknown placeholder {{{name}}} in template \"{template}\"")]
    UnknownPlaceholder { template: String, name: String },

    #[error("Unterminated placeholder in template \"{0}\"")]
    Unterminated(String),

    #[error("No value for {0}")]
    MissingValue(Placeholder),

    #[error("Rendered path component \"{0}\" is not a valid directory name")]
    InvalidComponent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(Placeholder),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    /// One entry per `/`-separated path component
    components: Vec<Vec<Segment>>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, DecisionAmbiguityError> {
        let mut components = Vec::new();
        for part in template.split('/') {
            components.push(parse_component(template, part)?);
        }
        Ok(Self {
            source: template.to_string(),
            components,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render to a relative path. Values are sanitized so they cannot add
    /// path components of their own.
    pub fn render(&self, values: &HashMap<Placeholder, String>) -> Result<PathBuf, DecisionAmbiguityError> {
        let mut path = PathBuf::new();
        for component in &self.components {
            let mut rendered = String::new();
            for segment in component {
                match segment {
                    Segment::Literal(text) => rendered.push_str(text),
                    Segment::Value(p) => {
                        let value = values
                            .get(p)
                            .map(|v| v.trim())
                            .filter(|v| !v.is_empty())
                            .ok_or(DecisionAmbiguityError::MissingValue(*p))?;
                        rendered.push_str(&sanitize_filename(value));
                    }
                }
            }
            let rendered = rendered.trim();
            if rendered.is_empty() || rendered == "." || rendered == ".." {
                return Err(DecisionAmbiguityError::InvalidComponent(rendered.to_string()));
            }
            path.push(rendered);
        }
        Ok(path)
    }
}

fn parse_component(template: &str, part: &str) -> Result<Vec<Segment>, DecisionAmbiguityError> {
    let mut segments = Vec::new();
    let mut rest = part;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| DecisionAmbiguityError::Unterminated(template.to_string()))?;
        let name = after[..close].trim();
        let placeholder =
            Placeholder::from_name(name).ok_or_else(|| DecisionAmbiguityError::UnknownPlaceholder {
                template: template.to_string(),
                name: name.to_string(),
            })?;
        segments.push(Segment::Value(placeholder));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// Sanitizes a filename by removing/replacing invalid characters
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}
