//! What to do when the destination album directory is already taken.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::model::{AlbumDirectory, QualityClass};
use crate::scanner::{ScanError, scan_album};

/// The axes two copies of an album are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlbumStanding {
    pub quality_rank: u8,
    /// Average kbps, when tags reported one
    pub bitrate: Option<u32>,
    pub tracks: usize,
}

impl AlbumStanding {
    pub fn of(album: &AlbumDirectory, quality: Option<QualityClass>) -> Self {
        Self {
            quality_rank: quality.or_else(|| album.quality()).map_or(0, |q| q.rank()),
            bitrate: album.average_bitrate(),
            tracks: album.track_count,
        }
    }

    /// True when `self` is equal or better than `other` on every axis. An
    /// unknown bitrate on either side does not count against anyone.
    pub fn covers(&self, other: &AlbumStanding) -> bool {
        let bitrate_ok = match (self.bitrate, other.bitrate) {
            (Some(mine), Some(theirs)) => mine >= theirs,
            _ => true,
        };
        self.quality_rank >= other.quality_rank && bitrate_ok && self.tracks >= other.tracks
    }
}

/// Where an incoming album should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateResolution {
    /// Destination is free (or holds no audio)
    Fresh(PathBuf),
    /// An equal or better copy is already there
    Skip { existing: PathBuf },
    /// Keep both; the incoming copy gets a numbered suffix
    Disambiguated(PathBuf),
}

impl DuplicateResolution {
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::Fresh(p) | Self::Disambiguated(p) => Some(p),
            Self::Skip { .. } => None,
        }
    }
}

/// Album directories that an in-flight move is filling. Shared by every
/// worker of every batch in the process, so two albums rendering the same
/// destination never both see it as free.
#[derive(Debug, Default)]
pub struct DestinationClaims {
    claimed: Mutex<HashSet<PathBuf>>,
}

/// Exclusive use of an album directory until dropped.
#[derive(Debug)]
pub struct DestinationClaim {
    claims: Arc<DestinationClaims>,
    path: PathBuf,
}

impl Drop for DestinationClaim {
    fn drop(&mut self) {
        self.claims.claimed.lock().remove(&self.path);
    }
}

impl DestinationClaims {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve the directory `resolution` points at. A directory another
    /// move already holds is swapped for the next free numbered sibling of
    /// `dest`; a copy still arriving cannot be compared, so both are kept.
    pub fn claim(
        self: &Arc<Self>,
        resolution: DuplicateResolution,
        dest: &Path,
    ) -> (DuplicateResolution, Option<DestinationClaim>) {
        let mut claimed = self.claimed.lock();
        let Some(target) = resolution.target() else {
            return (resolution, None);
        };

        let resolution = if claimed.contains(target) {
            DuplicateResolution::Disambiguated(next_free_name(dest, &claimed))
        } else {
            resolution
        };
        let path = resolution.target().unwrap_or(dest).to_path_buf();
        claimed.insert(path.clone());
        let claim = DestinationClaim {
            claims: Arc::clone(self),
            path,
        };
        (resolution, Some(claim))
    }

    /// [`resolve`] `dest` and claim the outcome. A directory another move
    /// holds is not scanned while it fills.
    pub fn resolve(
        self: &Arc<Self>,
        incoming: &AlbumDirectory,
        quality: QualityClass,
        dest: &Path,
    ) -> Result<(DuplicateResolution, Option<DestinationClaim>), ScanError> {
        if self.is_claimed(dest) {
            let (resolution, claim) = self.claim(DuplicateResolution::Fresh(dest.to_path_buf()), dest);
            if matches!(resolution, DuplicateResolution::Disambiguated(_)) {
                return Ok((resolution, claim));
            }
            // Released in between; compare with what it left
            drop(claim);
        }
        let resolution = resolve(incoming, quality, dest)?;
        Ok(self.claim(resolution, dest))
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.claimed.lock().contains(path)
    }
}

/// Compare the incoming album with whatever already occupies `dest`.
pub fn resolve(
    incoming: &AlbumDirectory,
    quality: QualityClass,
    dest: &Path,
) -> Result<DuplicateResolution, ScanError> {
    if !dest.is_dir() {
        return Ok(DuplicateResolution::Fresh(dest.to_path_buf()));
    }
    let existing = scan_album(dest)?;
    if existing.audio_files.is_empty() {
        return Ok(DuplicateResolution::Fresh(dest.to_path_buf()));
    }

    let theirs = AlbumStanding::of(&existing, None);
    let ours = AlbumStanding::of(incoming, Some(quality));
    if theirs.covers(&ours) {
        return Ok(DuplicateResolution::Skip {
            existing: dest.to_path_buf(),
        });
    }
    Ok(DuplicateResolution::Disambiguated(next_free_name(dest, &HashSet::new())))
}

/// First `"{dest} (n)"` for n = 2, 3, ... that neither exists nor is held by
/// another move.
pub fn next_free_name(dest: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (2u32..)
        .map(|n| dest.with_file_name(format!("{name} ({n})")))
        .find(|candidate| !candidate.exists() && !claimed.contains(candidate))
        .unwrap_or_else(|| dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioFile, AudioFormat};
    use std::fs;
    use tempfile::tempdir;

    fn album(path: &Path, format: AudioFormat, bitrate: Option<u32>, tracks: usize) -> AlbumDirectory {
        let files = (0..tracks)
            .map(|i| AudioFile {
                path: path.join(format!("{i:02}.{}", format.as_str())),
                format,
                bitrate,
                size: 10,
            })
            .collect();
        AlbumDirectory::new(path.to_path_buf(), files, vec![])
    }

    fn populate(dir: &Path, ext: &str, tracks: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..tracks {
            fs::write(dir.join(format!("{i:02}.{ext}")), b"audio").unwrap();
        }
    }

    #[test]
    fn test_free_destination_is_fresh() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Artist").join("Album");
        let incoming = album(Path::new("/in"), AudioFormat::Flac, None, 3);
        assert_eq!(
            resolve(&incoming, QualityClass::Lossless, &dest).unwrap(),
            DuplicateResolution::Fresh(dest)
        );
    }

    #[test]
    fn test_existing_lossless_beats_incoming_lossy() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Album");
        populate(&dest, "flac", 10);

        let incoming = album(Path::new("/in"), AudioFormat::Mp3, Some(320), 10);
        assert_eq!(
            resolve(&incoming, QualityClass::Lossy, &dest).unwrap(),
            DuplicateResolution::Skip { existing: dest }
        );
    }

    #[test]
    fn test_better_incoming_is_disambiguated() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Album");
        populate(&dest, "mp3", 10);
        populate(&dir.path().join("Album (2)"), "mp3", 1);

        let incoming = album(Path::new("/in"), AudioFormat::Flac, None, 10);
        assert_eq!(
            resolve(&incoming, QualityClass::Lossless, &dest).unwrap(),
            DuplicateResolution::Disambiguated(dir.path().join("Album (3)"))
        );
    }

    #[test]
    fn test_more_tracks_wins() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Album");
        populate(&dest, "flac", 8);

        let incoming = album(Path::new("/in"), AudioFormat::Flac, None, 10);
        assert!(matches!(
            resolve(&incoming, QualityClass::Lossless, &dest).unwrap(),
            DuplicateResolution::Disambiguated(_)
        ));
    }

    #[test]
    fn test_directory_without_audio_is_fresh() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Album");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("cover.jpg"), b"img").unwrap();

        let incoming = album(Path::new("/in"), AudioFormat::Flac, None, 1);
        assert_eq!(
            resolve(&incoming, QualityClass::Lossless, &dest).unwrap(),
            DuplicateResolution::Fresh(dest)
        );
    }

    #[test]
    fn test_claimed_destination_goes_to_next_free_sibling() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Album");
        let claims = DestinationClaims::new();

        let (first, held) = claims.claim(DuplicateResolution::Fresh(dest.clone()), &dest);
        assert_eq!(first, DuplicateResolution::Fresh(dest.clone()));
        let held = held.unwrap();

        let (second, other) = claims.claim(DuplicateResolution::Fresh(dest.clone()), &dest);
        assert_eq!(second, DuplicateResolution::Disambiguated(dir.path().join("Album (2)")));
        let (third, _third) = claims.claim(DuplicateResolution::Fresh(dest.clone()), &dest);
        assert_eq!(third, DuplicateResolution::Disambiguated(dir.path().join("Album (3)")));

        drop(other);
        assert!(!claims.is_claimed(&dir.path().join("Album (2)")));
        drop(held);
        assert!(!claims.is_claimed(&dest));
    }

    #[test]
    fn test_skip_claims_nothing() {
        let claims = DestinationClaims::new();
        let dest = PathBuf::from("/lib/Album");
        let (resolution, claim) = claims.claim(DuplicateResolution::Skip { existing: dest.clone() }, &dest);
        assert!(matches!(resolution, DuplicateResolution::Skip { .. }));
        assert!(claim.is_none());
        assert!(!claims.is_claimed(&dest));
    }

    #[test]
    fn test_bitrate_compared_only_when_known() {
        let a = AlbumStanding { quality_rank: 1, bitrate: Some(192), tracks: 10 };
        let b = AlbumStanding { quality_rank: 1, bitrate: Some(320), tracks: 10 };
        let unknown = AlbumStanding { bitrate: None, ..a };
        assert!(!a.covers(&b));
        assert!(b.covers(&a));
        assert!(unknown.covers(&b));
    }
}
