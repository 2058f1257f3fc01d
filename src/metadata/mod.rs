//! Audio file tag reading.
//!
//! Uses the lofty crate for format-independent metadata access. The pipeline
//! only depends on the [`MetadataReader`] trait, so tests can substitute
//! canned tags without real audio files.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::path::{Path, PathBuf};

use crate::model::AlbumDirectory;

/// Tags extracted from one audio file. Every field is optional: untagged
/// files are common in the collections this tool is pointed at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTags {
    pub path: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    /// Audio bitrate in kbps
    pub bitrate: Option<u32>,
}

/// Errors reading tags from a single file.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read tags from {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Tag-reading collaborator.
pub trait MetadataReader: Send + Sync {
    /// Read the tags of a single file.
    fn read_file(&self, path: &Path) -> Result<FileTags, MetadataError>;

    /// Read every audio file of an album, one result per file in order.
    fn read_album(&self, album: &AlbumDirectory) -> Vec<Result<FileTags, MetadataError>> {
        album
            .audio_files
            .iter()
            .map(|f| self.read_file(&f.path))
            .collect()
    }
}

/// [`MetadataReader`] backed by lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyReader;

impl MetadataReader for LoftyReader {
    fn read_file(&self, path: &Path) -> Result<FileTags, MetadataError> {
        let unreadable = |e: lofty::error::LoftyError| MetadataError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let tagged_file = Probe::open(path)
            .map_err(unreadable)?
            .read()
            .map_err(unreadable)?;

        let bitrate = tagged_file
            .properties()
            .audio_bitrate()
            .or_else(|| tagged_file.properties().overall_bitrate());

        // Get the primary tag, or fall back to the first available tag
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(FileTags {
                path: path.to_path_buf(),
                bitrate,
                ..Default::default()
            });
        };

        let text = |key: ItemKey| tag.get_string(&key).and_then(non_empty);

        Ok(FileTags {
            path: path.to_path_buf(),
            title: tag.title().as_deref().and_then(non_empty),
            artist: tag.artist().as_deref().and_then(non_empty),
            album_artist: text(ItemKey::AlbumArtist),
            album: tag.album().as_deref().and_then(non_empty),
            year: tag.year().map(|y| y as i32),
            label: text(ItemKey::Label),
            catalog_number: text(ItemKey::CatalogNumber),
            genre: tag.genre().as_deref().and_then(non_empty),
            track_number: tag.track(),
            bitrate,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty("  Artist "), Some("Artist".to_string()));
        assert_eq!(non_empty("   "), None);
    }

    #[test]
    fn test_lofty_reader_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.flac");
        std::fs::write(&path, b"definitely not flac").unwrap();

        let result = LoftyReader.read_file(&path);
        assert!(matches!(result, Err(MetadataError::Unreadable { .. })));
    }
}
