//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\album-organizer\config.toml
//! - macOS: ~/Library/Application Support/album-organizer/config.toml
//! - Linux: ~/.config/album-organizer/config.toml
//!
//! The config file is human-readable and editable. Command-line flags
//! override whatever is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::enrichment::MatchWeights;
use crate::model::OrganizationMode;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library locations and state store
    pub library: LibraryConfig,

    /// Worker pool settings
    pub workers: WorkerConfig,

    /// External catalog lookups
    pub enrichment: EnrichmentConfig,

    /// Organization rules and path templates
    pub decision: DecisionConfig,
}

/// Library management settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Default destination root
    pub destination: Option<PathBuf>,

    /// State store location (defaults to the data directory)
    pub database: Option<PathBuf>,

    /// Skip directories already processed with unchanged content
    pub incremental: bool,
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers (empty = available parallelism)
    pub count: Option<usize>,

    /// Emit a progress snapshot at least every N processed albums
    pub progress_interval: usize,

    /// Finished jobs kept for `list_recent`
    pub history_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: None,
            progress_interval: 10,
            history_size: 50,
        }
    }
}

/// Enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,

    /// Query Discogs in addition to MusicBrainz
    pub discogs_enabled: bool,

    /// Discogs personal access token
    pub discogs_token: Option<String>,

    /// Sent with every request; MusicBrainz rejects anonymous clients
    pub user_agent: String,

    /// Minimum confidence for a catalog record to replace local tags
    pub confidence_threshold: f32,

    pub weights: MatchWeights,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Cache lifetime in days
    pub cache_ttl_days: u64,

    pub musicbrainz_interval_ms: u64,
    pub discogs_interval_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            discogs_enabled: false,
            discogs_token: None,
            user_agent: concat!(
                "album-organizer/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/album-organizer/album-organizer)"
            )
            .to_string(),
            confidence_threshold: 0.7,
            weights: MatchWeights::default(),
            timeout_secs: 10,
            cache_ttl_days: 30,
            musicbrainz_interval_ms: 1000,
            discogs_interval_ms: 400,
        }
    }
}

/// A named catalog series: releases on `label` whose catalog number starts
/// with `catalog_prefix` are filed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPattern {
    pub name: String,
    pub label: String,
    pub catalog_prefix: String,
}

/// Path template per organization mode. Placeholders: `{quality}`,
/// `{artist}`, `{album}`, `{label}`, `{catalog}`, `{year}`, `{genre}`,
/// `{remixer}`, `{series}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub artist: String,
    pub label: String,
    pub series: String,
    pub remix: String,
    pub underground: String,
    pub compilation: String,
}

impl TemplateConfig {
    pub fn for_mode(&self, mode: OrganizationMode) -> &str {
        match mode {
            OrganizationMode::Artist => &self.artist,
            OrganizationMode::Label => &self.label,
            OrganizationMode::Series => &self.series,
            OrganizationMode::Remix => &self.remix,
            OrganizationMode::Underground => &self.underground,
            OrganizationMode::Compilation => &self.compilation,
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            artist: "{quality}/Artists/{artist}/{album}".to_string(),
            label: "{quality}/Labels/{label}/{artist} - {album}".to_string(),
            series: "{quality}/Series/{series}/{catalog} - {album}".to_string(),
            remix: "{quality}/Remixes/{remixer}/{artist} - {album}".to_string(),
            underground: "{quality}/Underground/{album}".to_string(),
            compilation: "{quality}/Compilations/{album}".to_string(),
        }
    }
}

/// Organization rule settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Enable label, series, remix and underground routing
    pub electronic: bool,

    /// Minimum organized releases before a label gets its own folder
    pub min_label_releases: i64,

    /// Releases sharing label and catalog prefix before they count as a series
    pub series_min_releases: i64,

    /// Phrases that mark an underground release in any field
    pub underground_keywords: Vec<String>,
    /// Bare tokens only trusted in the label and catalog number
    pub underground_label_tokens: Vec<String>,
    pub compilation_keywords: Vec<String>,
    pub remix_keywords: Vec<String>,
    pub various_artists_aliases: Vec<String>,
    pub series_patterns: Vec<SeriesPattern>,
    pub templates: TemplateConfig,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            electronic: false,
            min_label_releases: 3,
            series_min_releases: 3,
            underground_keywords: strings(&["white label", "test pressing", "promo only"]),
            underground_label_tokens: strings(&["white", "promo", "wl", "bootleg"]),
            compilation_keywords: strings(&["compilation", "various", "sampler", "collection", "anthology", "mixed by"]),
            remix_keywords: strings(&["remix", "remixes", "rmx", "mix", "rework", "edit"]),
            various_artists_aliases: strings(&["various artists", "various", "va", "v a", "v.a."]),
            series_patterns: Vec::new(),
            templates: TemplateConfig::default(),
        }
    }
}

impl Config {
    /// Check values that deserialize fine but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.enrichment.weights.validate().map_err(ConfigError::Invalid)?;

        let t = self.enrichment.confidence_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {t}"
            )));
        }
        if self.workers.count == Some(0) {
            return Err(ConfigError::Invalid("workers.count must be at least 1".into()));
        }
        if self.workers.history_size == 0 {
            return Err(ConfigError::Invalid("workers.history_size must be at least 1".into()));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(ConfigError::Invalid("enrichment.timeout_secs must be at least 1".into()));
        }
        for mode in OrganizationMode::ALL {
            if self.decision.templates.for_mode(mode).trim().is_empty() {
                return Err(ConfigError::Invalid(format!("template for {mode} mode is empty")));
            }
        }
        Ok(())
    }

    /// Worker count, falling back to the machine's parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers.count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("album-organizer"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default state store location
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("album-organizer").join(crate::db::DEFAULT_DB_NAME))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!(target: "config", "Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path, with the same fallbacks as [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(target: "config", "No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => match config.validate() {
                Ok(()) => {
                    tracing::info!(target: "config", "Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!(target: "config", "Invalid config file {:?}: {}", path, e);
                    tracing::warn!(target: "config", "Using default configuration");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::error!(target: "config", "Failed to parse config file {:?}: {}", path, e);
                tracing::warn!(target: "config", "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(target: "config", "Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", "Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
