//! Core data models for the organization pipeline.
//!
//! Defines the entities that flow between the scanner, classifier, decision
//! engine and move executor: [`AlbumDirectory`], [`QualityClass`],
//! [`MetadataRecord`], [`OrganizationDecision`] and [`MoveOperation`].
//!
//! # Database Schema
//!
//! The persisted subset maps to these tables (see `migrations/`):
//! - `albums` - One row per organized release with the rendered metadata
//! - `moves` - Append-only move journal
//! - `processed_directories` - Incremental-mode markers
//! - `metadata_cache` - Enrichment lookups (including negative results)
//! - `release_counts` - Per-artist / per-label / per-series release counters

pub mod text;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Audio container/codec family, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Flac,
    Wav,
    Aiff,
    Ape,
    WavPack,
    Alac,
    Mp3,
    Ogg,
    Opus,
    M4a,
    Aac,
    Wma,
}

impl AudioFormat {
    /// Map a file extension (case-insensitive, without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext.to_ascii_lowercase().as_str() {
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "aiff" | "aif" => Self::Aiff,
            "ape" => Self::Ape,
            "wv" => Self::WavPack,
            "alac" => Self::Alac,
            "mp3" => Self::Mp3,
            "ogg" | "oga" => Self::Ogg,
            "opus" => Self::Opus,
            // ALAC inside m4a cannot be told apart by extension; treated as lossy
            "m4a" => Self::M4a,
            "aac" => Self::Aac,
            "wma" => Self::Wma,
            _ => return None,
        })
    }

    /// Detect the format of a path from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_lossless(&self) -> bool {
        matches!(
            self,
            Self::Flac | Self::Wav | Self::Aiff | Self::Ape | Self::WavPack | Self::Alac
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Aiff => "aiff",
            Self::Ape => "ape",
            Self::WavPack => "wv",
            Self::Alac => "alac",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::M4a => "m4a",
            Self::Aac => "aac",
            Self::Wma => "wma",
        }
    }
}

/// A single audio file inside an album directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    /// Absolute file path
    pub path: PathBuf,
    /// Format derived from the extension
    pub format: AudioFormat,
    /// Average bitrate in kbps (filled in from tags during classification)
    pub bitrate: Option<u32>,
    /// File size in bytes
    pub size: u64,
}

/// One album directory as found at scan time.
///
/// Built by the scanner, completed with bitrates by the classifier, and never
/// changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumDirectory {
    /// Absolute directory path
    pub path: PathBuf,
    /// Audio files directly inside the directory
    pub audio_files: Vec<AudioFile>,
    /// Non-audio companions (cover art, cue sheets, logs) moved along with the album
    pub extra_files: Vec<PathBuf>,
    /// Number of audio files
    pub track_count: usize,
    /// Sum of audio file sizes in bytes
    pub total_size: u64,
}

impl AlbumDirectory {
    pub fn new(path: PathBuf, audio_files: Vec<AudioFile>, extra_files: Vec<PathBuf>) -> Self {
        let track_count = audio_files.len();
        let total_size = audio_files.iter().map(|f| f.size).sum();
        Self {
            path,
            audio_files,
            extra_files,
            track_count,
            total_size,
        }
    }

    /// Last path component, used for display and for the unsorted bucket.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Mean bitrate over files that report one.
    pub fn average_bitrate(&self) -> Option<u32> {
        let known: Vec<u32> = self.audio_files.iter().filter_map(|f| f.bitrate).collect();
        if known.is_empty() {
            return None;
        }
        Some((known.iter().map(|&b| b as u64).sum::<u64>() / known.len() as u64) as u32)
    }

    pub fn quality(&self) -> Option<QualityClass> {
        QualityClass::from_formats(self.audio_files.iter().map(|f| f.format))
    }
}

/// Lossless/Lossy/Mixed classification of an album's audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityClass {
    Lossless,
    Lossy,
    Mixed,
}

impl QualityClass {
    /// Derive the class from the set of formats present.
    ///
    /// Returns `None` only for an empty set.
    pub fn from_formats(formats: impl IntoIterator<Item = AudioFormat>) -> Option<Self> {
        let mut lossless = false;
        let mut lossy = false;
        for format in formats {
            if format.is_lossless() {
                lossless = true;
            } else {
                lossy = true;
            }
        }
        match (lossless, lossy) {
            (true, true) => Some(Self::Mixed),
            (true, false) => Some(Self::Lossless),
            (false, true) => Some(Self::Lossy),
            (false, false) => None,
        }
    }

    /// Ordering used when comparing duplicate releases (higher is better).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Lossless => 2,
            Self::Mixed => 1,
            Self::Lossy => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lossless => "Lossless",
            Self::Lossy => "Lossy",
            Self::Mixed => "Mixed",
        }
    }
}

impl FromStr for QualityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lossless" => Ok(Self::Lossless),
            "lossy" => Ok(Self::Lossy),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown quality class: {other}")),
        }
    }
}

/// Where a metadata record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceName {
    Discogs,
    #[serde(rename = "musicbrainz")]
    MusicBrainz,
    LocalTags,
}

impl SourceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discogs => "discogs",
            Self::MusicBrainz => "musicbrainz",
            Self::LocalTags => "local-tags",
        }
    }

    /// Tie-break priority between remote sources (lower wins).
    pub fn priority(&self) -> u8 {
        match self {
            Self::MusicBrainz => 0,
            Self::Discogs => 1,
            Self::LocalTags => 2,
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discogs" => Ok(Self::Discogs),
            "musicbrainz" => Ok(Self::MusicBrainz),
            "local-tags" => Ok(Self::LocalTags),
            other => Err(format!("unknown metadata source: {other}")),
        }
    }
}

/// The authoritative metadata chosen for one album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub artist: Option<String>,
    pub album_title: Option<String>,
    pub year: Option<i32>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub genre: Option<String>,
    /// External release id (MusicBrainz MBID or Discogs release id)
    pub source_id: Option<String>,
    /// Match confidence in `[0, 1]`
    pub confidence: f32,
    pub source_name: SourceName,
    /// Remixing artist, when the catalog credits one separately
    #[serde(default)]
    pub remixer: Option<String>,
}

impl MetadataRecord {
    /// An empty record attributed to local tags.
    pub fn local(confidence: f32) -> Self {
        Self {
            artist: None,
            album_title: None,
            year: None,
            label: None,
            catalog_number: None,
            genre: None,
            source_id: None,
            confidence,
            source_name: SourceName::LocalTags,
            remixer: None,
        }
    }

    /// Fill fields that are missing here from `other`, keeping our own values.
    pub fn fill_missing_from(&mut self, other: &MetadataRecord) {
        self.artist = self.artist.take().or_else(|| other.artist.clone());
        self.album_title = self.album_title.take().or_else(|| other.album_title.clone());
        self.year = self.year.or(other.year);
        self.label = self.label.take().or_else(|| other.label.clone());
        self.catalog_number = self.catalog_number.take().or_else(|| other.catalog_number.clone());
        self.genre = self.genre.take().or_else(|| other.genre.clone());
        self.remixer = self.remixer.take().or_else(|| other.remixer.clone());
    }
}

/// Routing strategy chosen for a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationMode {
    Artist,
    Label,
    Series,
    Remix,
    Underground,
    Compilation,
}

impl OrganizationMode {
    pub const ALL: [OrganizationMode; 6] = [
        Self::Artist,
        Self::Label,
        Self::Series,
        Self::Remix,
        Self::Underground,
        Self::Compilation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Label => "label",
            Self::Series => "series",
            Self::Remix => "remix",
            Self::Underground => "underground",
            Self::Compilation => "compilation",
        }
    }
}

impl fmt::Display for OrganizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrganizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown organization mode: {s}"))
    }
}

/// One step of the decision chain, kept for auditability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    /// Rule name (`series`, `underground`, `remix`, `label_vs_artist`, ...)
    pub rule: &'static str,
    /// What the rule concluded, human readable
    pub outcome: String,
}

impl fmt::Display for RuleHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.outcome)
    }
}

pub type RuleTrace = SmallVec<[RuleHit; 8]>;

/// Render a trace as a single `;`-separated line for storage and logs.
pub fn format_trace(trace: &RuleTrace) -> String {
    trace
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Where an album goes and why.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationDecision {
    pub mode: OrganizationMode,
    /// Destination album directory
    pub destination_path: PathBuf,
    pub rule_trace: RuleTrace,
}

/// Status of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
}

impl MoveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl FromStr for MoveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(format!("unknown move status: {other}")),
        }
    }
}

/// A move journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOperation {
    /// Unique id (journal row id)
    pub operation_id: i64,
    /// Batch this operation belongs to
    pub batch_id: String,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub status: MoveStatus,
    /// Size of the moved file, recorded on completion
    pub size: Option<u64>,
    /// Modification time (unix seconds) of the moved file, recorded on completion
    pub mtime: Option<i64>,
    /// Content hash of the moved file, recorded on completion
    pub content_hash: Option<String>,
    /// For `rolled_back` entries: the operation that was undone
    pub rolls_back: Option<i64>,
    /// Failure or rollback detail
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}
