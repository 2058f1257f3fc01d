//! Single-file moves.
//!
//! On one volume a file is hard-linked into place and then unlinked from its
//! source, so an existing destination is never replaced. Across volumes the
//! file is copied to a hidden `.name.partial` next to the destination, synced,
//! verified against the source and linked into place the same way; only then
//! is the source deleted. Either way the source is untouched when the move
//! fails.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::MoveError;
use crate::scanner::{FileFingerprint, PARTIAL_SUFFIX, compute_file_hash};

/// `EXDEV` on Linux and macOS
const EXDEV: i32 = 18;

/// Move `source` to `dest`, returning the fingerprint of the file at its new
/// location. Parent directories of `dest` are created as needed; an existing
/// `dest` is never overwritten.
pub fn move_file(source: &Path, dest: &Path) -> Result<FileFingerprint, MoveError> {
    let io_err = |e: io::Error| MoveError::Io {
        source_path: source.to_path_buf(),
        dest: dest.to_path_buf(),
        source: e,
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    if dest.exists() {
        return Err(MoveError::DestinationExists(dest.to_path_buf()));
    }

    match place_no_clobber(source, dest) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(MoveError::DestinationExists(dest.to_path_buf()));
        }
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                target: "organizer::fs",
                source = %source.display(),
                dest = %dest.display(),
                "Cross-device move, copying"
            );
            copy_verify_rename(source, dest)?;
        }
        Err(e) => return Err(io_err(e)),
    }

    FileFingerprint::of(dest).map_err(io_err)
}

fn is_cross_device(e: &io::Error) -> bool {
    e.kind() == ErrorKind::CrossesDevices || e.raw_os_error() == Some(EXDEV)
}

/// Put `from` at `to`, failing with `AlreadyExists` instead of replacing `to`.
///
/// `link(2)` refuses an existing target atomically, unlike `rename(2)`.
/// Filesystems without hard links get an exists check and a rename.
fn place_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
            if to.exists() {
                return Err(ErrorKind::AlreadyExists.into());
            }
            fs::rename(from, to)
        }
        Err(e) => Err(e),
    }
}

/// Hidden temporary name used while copying into `dest`'s directory.
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

/// Copy through a partial file, verify, rename into place, delete the source.
pub(crate) fn copy_verify_rename(source: &Path, dest: &Path) -> Result<(), MoveError> {
    let io_err = |e: io::Error| MoveError::Io {
        source_path: source.to_path_buf(),
        dest: dest.to_path_buf(),
        source: e,
    };
    let partial = partial_path(dest);

    let copied = (|| -> io::Result<bool> {
        let mut reader = File::open(source)?;
        let mut writer = File::create(&partial)?;
        io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;
        drop(writer);

        let same_size = fs::metadata(source)?.len() == fs::metadata(&partial)?.len();
        Ok(same_size && compute_file_hash(source)? == compute_file_hash(&partial)?)
    })();

    match copied {
        Ok(true) => {}
        Ok(false) => {
            let _ = fs::remove_file(&partial);
            return Err(MoveError::VerifyFailed {
                path: source.to_path_buf(),
            });
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(io_err(e));
        }
    }

    if let Err(e) = place_no_clobber(&partial, dest) {
        let _ = fs::remove_file(&partial);
        if e.kind() == ErrorKind::AlreadyExists {
            return Err(MoveError::DestinationExists(dest.to_path_buf()));
        }
        return Err(io_err(e));
    }
    if let Err(e) = fs::remove_file(source) {
        tracing::warn!(
            target: "organizer::fs",
            source = %source.display(),
            error = %e,
            "Copied but could not delete source"
        );
        let _ = fs::remove_file(dest);
        return Err(io_err(e));
    }
    Ok(())
}

/// Remove `path` and its ancestors while they are empty, never removing
/// `stop` or anything above it.
pub fn remove_empty_dirs(path: &Path, stop: &Path) -> io::Result<()> {
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) || !dir.is_dir() {
            break;
        }
        if fs::read_dir(dir)?.next().is_some() {
            break;
        }
        fs::remove_dir(dir)?;
        current = dir.parent();
    }
    Ok(())
}

/// Remove every empty directory inside `root`, and `root` itself if it ends
/// up empty. Directories that still hold files are left alone.
pub fn prune_empty_tree(root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry?;
        if !entry.file_type().is_dir() || fs::read_dir(entry.path())?.next().is_some() {
            continue;
        }
        match fs::remove_dir(entry.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
