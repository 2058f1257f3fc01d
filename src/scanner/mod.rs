//! Album directory discovery.
//!
//! An album directory is any directory that directly contains at least one
//! audio file. Discovery walks the source tree once; each album is then
//! scanned on its own so that one unreadable directory only skips that album.

pub mod hash;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::model::{AlbumDirectory, AudioFile, AudioFormat};

pub use hash::{FileFingerprint, compute_file_hash, directory_content_hash};

/// Suffix of in-flight cross-volume copies; never treated as album content.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Errors while reading the source tree.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Cannot read directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Check if a path has a supported audio file extension.
pub fn is_audio_file(path: &Path) -> bool {
    !is_partial_file(path) && AudioFormat::from_path(path).is_some()
}

fn is_partial_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(PARTIAL_SUFFIX))
}

/// Find every album directory under `root`, skipping anything under `exclude`
/// (typically the destination library when it lives inside the source tree).
///
/// Returns directories in sorted order. Subdirectories that cannot be read
/// are logged and skipped.
pub fn discover_albums(root: &Path, exclude: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let meta = std::fs::metadata(root).map_err(|source| ScanError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut albums = BTreeSet::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path().starts_with(x)));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(target: "scanner", error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file()
            && is_audio_file(entry.path())
            && let Some(parent) = entry.path().parent()
        {
            albums.insert(parent.to_path_buf());
        }
    }

    tracing::debug!(target: "scanner", root = %root.display(), albums = albums.len(), "Discovery complete");
    Ok(albums.into_iter().collect())
}

/// Build an [`AlbumDirectory`] from the files directly inside `path`.
///
/// Bitrates are left unknown; the classifier fills them in from tags.
pub fn scan_album(path: &Path) -> Result<AlbumDirectory, ScanError> {
    let unreadable = |source| ScanError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut audio_files = Vec::new();
    let mut extra_files = Vec::new();

    for entry in std::fs::read_dir(path).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let file_type = entry.file_type().map_err(unreadable)?;
        if !file_type.is_file() {
            continue;
        }
        let file_path = entry.path();
        if is_partial_file(&file_path) {
            continue;
        }
        match AudioFormat::from_path(&file_path) {
            Some(format) => {
                let size = entry.metadata().map_err(unreadable)?.len();
                audio_files.push(AudioFile {
                    path: file_path,
                    format,
                    bitrate: None,
                    size,
                });
            }
            None => extra_files.push(file_path),
        }
    }

    audio_files.sort_by(|a, b| a.path.cmp(&b.path));
    extra_files.sort();
    Ok(AlbumDirectory::new(path.to_path_buf(), audio_files, extra_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_discover_albums_finds_directories_with_audio() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        let album_a = root.join("Artist - Album A");
        let album_b = root.join("nested").join("Album B");
        let not_album = root.join("docs");
        for d in [&album_a, &album_b, &not_album] {
            std::fs::create_dir_all(d).unwrap();
        }
        File::create(album_a.join("01.flac")).unwrap();
        File::create(album_a.join("cover.jpg")).unwrap();
        File::create(album_b.join("01.MP3")).unwrap(); // case-insensitive
        File::create(not_album.join("notes.txt")).unwrap();

        let albums = discover_albums(root, &[]).unwrap();
        assert_eq!(albums, vec![album_a, album_b]);
    }

    #[test]
    fn test_discover_albums_honours_exclusions() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let library = root.join("Library");
        let incoming = root.join("incoming");
        std::fs::create_dir_all(library.join("Artist").join("Album")).unwrap();
        std::fs::create_dir_all(&incoming).unwrap();
        File::create(library.join("Artist").join("Album").join("01.flac")).unwrap();
        File::create(incoming.join("01.flac")).unwrap();

        let albums = discover_albums(root, &[library]).unwrap();
        assert_eq!(albums, vec![incoming]);
    }

    #[test]
    fn test_discover_rejects_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            discover_albums(&missing, &[]),
            Err(ScanError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_scan_album_splits_audio_and_extras() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("02.flac"), b"22").unwrap();
        std::fs::write(dir.path().join("01.flac"), b"1").unwrap();
        std::fs::write(dir.path().join("folder.jpg"), b"img").unwrap();
        std::fs::write(dir.path().join(".03.flac.partial"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("Scans")).unwrap();

        let album = scan_album(dir.path()).unwrap();
        assert_eq!(album.track_count, 2);
        assert_eq!(album.total_size, 3);
        assert!(album.audio_files[0].path.ends_with("01.flac"));
        assert_eq!(album.extra_files.len(), 1);
        assert!(album.extra_files[0].ends_with("folder.jpg"));
    }
}
