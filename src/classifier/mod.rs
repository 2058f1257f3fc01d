//! Quality classification and local-tag metadata.
//!
//! Derives the [`QualityClass`] of an album from its file formats and a
//! best-effort [`MetadataRecord`] from the per-file tags. Tags are untrusted,
//! so the local record always carries [`LOCAL_TAG_CONFIDENCE`].

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;

use crate::metadata::{FileTags, MetadataError};
use crate::model::{AlbumDirectory, MetadataRecord, QualityClass};

/// Confidence assigned to metadata read from local tags.
pub const LOCAL_TAG_CONFIDENCE: f32 = 0.3;

/// Album could not be classified; it is routed to the unsorted bucket.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("No audio files in {0}")]
    NoAudioFiles(PathBuf),

    #[error("None of the {files} audio files in {path} could be read")]
    NoReadableFiles { path: PathBuf, files: usize },
}

/// Classifier output for one album.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The album with bitrates filled in from tags
    pub album: AlbumDirectory,
    pub quality: QualityClass,
    /// Best-effort metadata from tags, confidence fixed at the local baseline
    pub local: MetadataRecord,
    /// Files whose tags could not be read (surfaced as job warnings)
    pub unreadable: Vec<PathBuf>,
}

/// Classify an album from its directory listing and per-file tag results.
///
/// `tags` is expected in the same order as `album.audio_files`.
pub fn classify(
    album: &AlbumDirectory,
    tags: Vec<Result<FileTags, MetadataError>>,
) -> Result<Classification, ClassificationError> {
    let quality = QualityClass::from_formats(album.audio_files.iter().map(|f| f.format))
        .ok_or_else(|| ClassificationError::NoAudioFiles(album.path.clone()))?;

    let mut readable = Vec::new();
    let mut unreadable = Vec::new();
    for result in tags {
        match result {
            Ok(t) => readable.push(t),
            Err(MetadataError::Unreadable { path, message }) => {
                tracing::debug!(target: "classifier", path = %path.display(), %message, "Unreadable tags");
                unreadable.push(path);
            }
        }
    }
    if readable.is_empty() {
        return Err(ClassificationError::NoReadableFiles {
            path: album.path.clone(),
            files: album.audio_files.len(),
        });
    }

    let mut completed = album.clone();
    for file in &mut completed.audio_files {
        if let Some(t) = readable.iter().find(|t| t.path == file.path) {
            file.bitrate = t.bitrate;
        }
    }

    let local = local_record(album, &readable);
    Ok(Classification {
        album: completed,
        quality,
        local,
        unreadable,
    })
}

/// Build the local record by majority vote across files.
fn local_record(album: &AlbumDirectory, tags: &[FileTags]) -> MetadataRecord {
    let (dir_artist, dir_title) = split_directory_name(&album.name());

    // Album artist wins over track artist when present on most files
    let artist = majority(tags.iter().filter_map(|t| t.album_artist.clone()))
        .or_else(|| majority(tags.iter().filter_map(|t| t.artist.clone())))
        .or(dir_artist);

    MetadataRecord {
        artist,
        album_title: majority(tags.iter().filter_map(|t| t.album.clone())).or(Some(dir_title)),
        year: majority(tags.iter().filter_map(|t| t.year)),
        label: majority(tags.iter().filter_map(|t| t.label.clone())),
        catalog_number: majority(tags.iter().filter_map(|t| t.catalog_number.clone())),
        genre: majority(tags.iter().filter_map(|t| t.genre.clone())),
        ..MetadataRecord::local(LOCAL_TAG_CONFIDENCE)
    }
}

/// Most frequent value; ties go to the value seen first.
fn majority<T: Eq + Hash + Clone>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (idx, v) in values.enumerate() {
        counts.entry(v).or_insert((0, idx)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, ia)), (_, (cb, ib))| ca.cmp(cb).then(ib.cmp(ia)))
        .map(|(v, _)| v)
}

/// Split `"Artist - Title"` directory names. Without a separator the whole
/// name is the title.
fn split_directory_name(name: &str) -> (Option<String>, String) {
    match name.split_once(" - ") {
        Some((artist, title)) if !artist.trim().is_empty() && !title.trim().is_empty() => {
            (Some(artist.trim().to_string()), title.trim().to_string())
        }
        _ => (None, name.trim().to_string()),
    }
}
