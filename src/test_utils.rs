//! Test utilities and fixtures for album-organizer tests.
//!
//! This module provides a throwaway state store, a canned-tag
//! [`MetadataReader`], and helpers for laying out album directories on disk.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MockReader, temp_db, write_album};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _db) = temp_db().await;
//!     let dir = tempfile::tempdir().unwrap();
//!     let album = write_album(dir.path(), "Plaid - Spokes", &["01.flac"]);
//!     let reader = MockReader::album("Plaid", "Spokes");
//!     // ... test logic
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::metadata::{FileTags, MetadataError, MetadataReader};
use crate::model::AudioFormat;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// # Returns
///
/// A tuple of (connection pool, temp directory handle).
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Create `parent/name` containing `files`.
///
/// Each file gets distinct content derived from its album and file name, so
/// content hashes differ between albums.
pub fn write_album(parent: &Path, name: &str, files: &[&str]) -> PathBuf {
    let dir = parent.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create album directory");
    for file in files {
        std::fs::write(dir.join(file), format!("{name}/{file}")).expect("Failed to write album file");
    }
    dir
}

/// [`MetadataReader`] returning the same canned tags for every file.
///
/// Unset fields stay `None`, so the classifier falls back to the directory
/// name. Lossy files report 320 kbps.
#[derive(Debug, Clone, Default)]
pub struct MockReader {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub year: Option<i32>,
    /// Every read fails
    pub unreadable: bool,
}

impl MockReader {
    pub fn album(artist: &str, album: &str) -> Self {
        Self {
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            ..Self::default()
        }
    }

    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_catalog_number(mut self, catalog_number: &str) -> Self {
        self.catalog_number = Some(catalog_number.to_string());
        self
    }
}

impl MetadataReader for MockReader {
    fn read_file(&self, path: &Path) -> Result<FileTags, MetadataError> {
        if self.unreadable {
            return Err(MetadataError::Unreadable {
                path: path.to_path_buf(),
                message: "mock read failure".to_string(),
            });
        }
        let lossy = AudioFormat::from_path(path).is_some_and(|f| !f.is_lossless());
        Ok(FileTags {
            path: path.to_path_buf(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            label: self.label.clone(),
            catalog_number: self.catalog_number.clone(),
            year: self.year,
            bitrate: lossy.then_some(320),
            ..FileTags::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;
        assert_eq!(crate::db::journal::count_operations(&pool, None).await.unwrap(), 0);
    }

    #[test]
    fn test_write_album_distinct_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_album(dir.path(), "A", &["01.flac"]);
        let b = write_album(dir.path(), "B", &["01.flac"]);
        assert_ne!(
            std::fs::read(a.join("01.flac")).unwrap(),
            std::fs::read(b.join("01.flac")).unwrap()
        );
    }

    #[test]
    fn test_mock_reader() {
        let reader = MockReader::album("Plaid", "Spokes").with_label("Warp Records");
        let tags = reader.read_file(Path::new("/in/01.mp3")).unwrap();
        assert_eq!(tags.artist.as_deref(), Some("Plaid"));
        assert_eq!(tags.label.as_deref(), Some("Warp Records"));
        assert_eq!(tags.bitrate, Some(320));

        assert!(MockReader::unreadable().read_file(Path::new("/in/01.mp3")).is_err());
    }
}
