//! File and directory hashing for change detection.
//!
//! Large files are hashed partially (first and last 1MB plus the size), which
//! is enough to notice edits between a move and its rollback, and to key the
//! incremental-mode markers.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::model::AlbumDirectory;

const CHUNK_SIZE: u64 = 1024 * 1024; // 1MB

/// Compute a partial hash of a file (first 1MB + last 1MB).
///
/// The file size is included in the hash, so files of different sizes
/// will have different hashes even if their sampled content matches.
///
/// Returns the SHA256 hash as a lowercase hex string (64 characters).
pub fn compute_file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let mut hasher = Sha256::new();
    hasher.update(file_size.to_le_bytes());

    if file_size <= CHUNK_SIZE * 2 {
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        hasher.update(&buffer);
    } else {
        let mut buffer = vec![0u8; CHUNK_SIZE as usize];

        file.read_exact(&mut buffer)?;
        hasher.update(&buffer);

        file.seek(SeekFrom::End(-(CHUNK_SIZE as i64)))?;
        file.read_exact(&mut buffer)?;
        hasher.update(&buffer);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Size, mtime and content hash of a file at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    /// Unix seconds
    pub mtime: i64,
    pub hash: String,
}

impl FileFingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            mtime,
            hash: compute_file_hash(path)?,
        })
    }

    /// Whether the file at `path` still has this size and content.
    ///
    /// mtime is informational only: a copy across volumes changes it without
    /// changing the content.
    pub fn matches(&self, path: &Path) -> std::io::Result<bool> {
        let meta = std::fs::metadata(path)?;
        if meta.len() != self.size {
            return Ok(false);
        }
        Ok(compute_file_hash(path)? == self.hash)
    }
}

/// Hash an album directory's audio content: every file's name and partial
/// content hash, in name order. Files are hashed in parallel.
///
/// Renaming the directory does not change the hash; changing, adding or
/// removing a track does.
pub fn directory_content_hash(album: &AlbumDirectory) -> std::io::Result<String> {
    let mut entries: Vec<(String, String)> = album
        .audio_files
        .par_iter()
        .map(|file| {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            compute_file_hash(&file.path).map(|h| (name, h))
        })
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, hash) in &entries {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_album;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_compute_file_hash_small_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.txt");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"Hello, world!").unwrap();
        drop(file);

        let hash = compute_file_hash(&file_path).unwrap();
        assert_eq!(hash.len(), 64); // SHA256 hex
        assert_eq!(hash, compute_file_hash(&file_path).unwrap());
    }

    #[test]
    fn test_compute_file_hash_large_file_samples_ends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut data = vec![0u8; (CHUNK_SIZE * 3) as usize];
        std::fs::write(&path, &data).unwrap();
        let before = compute_file_hash(&path).unwrap();

        // Change the last byte: the tail chunk is hashed, so this is noticed
        let last = data.len() - 1;
        data[last] = 1;
        std::fs::write(&path, &data).unwrap();
        assert_ne!(before, compute_file_hash(&path).unwrap());
    }

    #[test]
    fn test_fingerprint_detects_modification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.flac");
        std::fs::write(&path, b"original").unwrap();

        let fp = FileFingerprint::of(&path).unwrap();
        assert!(fp.matches(&path).unwrap());

        std::fs::write(&path, b"modified").unwrap();
        assert!(!fp.matches(&path).unwrap());

        std::fs::write(&path, b"longer content").unwrap();
        assert!(!fp.matches(&path).unwrap());
    }

    #[test]
    fn test_directory_hash_ignores_directory_name() {
        let root = tempdir().unwrap();
        let a = root.path().join("Album A");
        let b = root.path().join("Album B");
        for dir in [&a, &b] {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("01.mp3"), b"one").unwrap();
            std::fs::write(dir.join("02.mp3"), b"two").unwrap();
        }
        let ha = directory_content_hash(&scan_album(&a).unwrap()).unwrap();
        let hb = directory_content_hash(&scan_album(&b).unwrap()).unwrap();
        assert_eq!(ha, hb);

        std::fs::write(b.join("02.mp3"), b"changed").unwrap();
        let hb2 = directory_content_hash(&scan_album(&b).unwrap()).unwrap();
        assert_ne!(ha, hb2);
    }
}
