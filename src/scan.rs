//! Folder scanning
//!
//! A vault covers exactly one directory level. Entries are listed once and
//! sorted by file name so that every consumer (encryption batches, duplicate
//! clustering) sees the same deterministic order.

use crate::error::{ErrorCategory, Result, VaultError};
use crate::fsutil;
use crate::hasher::{self, ContentHash, PerceptualHash};
use crate::keystore::{KEY_FILE, VERIFIER_FILE};
use crate::lock::LOCK_FILE;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File names owned by the vault itself. They are never encrypted,
/// hashed, or deleted.
pub const RESERVED_NAMES: &[&str] = &[KEY_FILE, VERIFIER_FILE, LOCK_FILE];

/// Extensions that get a perceptual hash.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub fn is_reserved(name: &OsStr) -> bool {
    RESERVED_NAMES.iter().any(|reserved| name == OsStr::new(reserved))
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Regular, non-reserved files directly inside `folder`, sorted by name.
///
/// Directories and symlinks are skipped.
pub fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(folder).map_err(|e| {
        VaultError::io(
            ErrorCategory::User,
            format!("failed to list {}", folder.display()),
            e,
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            VaultError::io(
                ErrorCategory::Internal,
                format!("failed to list {}", folder.display()),
                e,
            )
        })?;
        let file_type = entry.file_type().map_err(|e| {
            VaultError::io(
                ErrorCategory::Internal,
                format!("failed to stat {}", entry.path().display()),
                e,
            )
        })?;
        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        }
        if is_reserved(&entry.file_name()) {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// Fingerprints of one file, taken during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub content_hash: ContentHash,
    pub perceptual_hash: Option<PerceptualHash>,
}

impl FileRecord {
    /// Read and fingerprint a single file.
    ///
    /// A file with an image extension that fails to decode is still
    /// returned, without a perceptual hash; the decode failure is returned
    /// alongside so the caller can report it.
    pub fn read(path: &Path) -> Result<(Self, Option<VaultError>)> {
        let bytes = fsutil::read_file(path)?;

        let (perceptual_hash, skipped) = if is_image_path(path) {
            match hasher::hash_perceptual(&bytes) {
                Ok(hash) => (Some(hash), None),
                Err(e) => (None, Some(e)),
            }
        } else {
            (None, None)
        };

        let record = FileRecord {
            path: path.to_path_buf(),
            size: bytes.len() as u64,
            content_hash: hasher::hash_content(&bytes),
            perceptual_hash,
        };
        Ok((record, skipped))
    }
}

/// Lazy scan over a folder. Files are only read as the iterator advances.
#[derive(Debug)]
pub struct Scan {
    paths: Vec<PathBuf>,
    next: usize,
    skipped: Vec<(PathBuf, VaultError)>,
}

/// Start scanning `folder`. The directory listing happens here; reading and
/// hashing happen lazily.
pub fn scan(folder: &Path) -> Result<Scan> {
    Ok(Scan {
        paths: list_files(folder)?,
        next: 0,
        skipped: Vec::new(),
    })
}

impl Scan {
    /// Number of files the scan will visit.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Rewind to the first file. Fingerprints are recomputed from disk on
    /// the next pass.
    pub fn restart(&mut self) {
        self.next = 0;
        self.skipped.clear();
    }

    /// Images that could not be decoded on the current pass. They are still
    /// yielded as records, matched by content hash only.
    pub fn skipped(&self) -> &[(PathBuf, VaultError)] {
        &self.skipped
    }
}

impl Iterator for Scan {
    type Item = Result<FileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.get(self.next)?.clone();
        self.next += 1;

        match FileRecord::read(&path) {
            Ok((record, None)) => Some(Ok(record)),
            Ok((record, Some(e))) => {
                warn!(path = %path.display(), error = %e, "skipping invalid image file");
                self.skipped.push((path, e));
                Some(Ok(record))
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.paths.len() - self.next;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join(KEY_FILE), b"k").unwrap();
        fs::write(dir.path().join(VERIFIER_FILE), b"v").unwrap();
        fs::write(dir.path().join(LOCK_FILE), b"1").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link")).unwrap();

        assert_eq!(list_files(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_records() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let records: Vec<FileRecord> = scan(dir.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, 5);
        assert_eq!(records[0].content_hash, hasher::hash_content(b"hello"));
        assert!(records[0].perceptual_hash.is_none());
    }

    #[test]
    fn test_invalid_image_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let mut scan = scan(dir.path()).unwrap();
        let record = scan.next().unwrap().unwrap();
        assert!(record.perceptual_hash.is_none());
        assert_eq!(scan.skipped().len(), 1);
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_restart() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();

        let mut scan = scan(dir.path()).unwrap();
        let first: Vec<PathBuf> = scan.by_ref().map(|r| r.unwrap().path).collect();
        scan.restart();
        let second: Vec<PathBuf> = scan.map(|r| r.unwrap().path).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_read_failure_is_yielded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let mut scan = scan(dir.path()).unwrap();
        fs::remove_file(dir.path().join("a.txt")).unwrap();
        assert!(scan.next().unwrap().is_err());
    }

    #[test]
    fn test_image_extension_detection() {
        assert!(is_image_path(Path::new("x.JPG")));
        assert!(is_image_path(Path::new("x.png")));
        assert!(!is_image_path(Path::new("x.txt")));
        assert!(!is_image_path(Path::new("noext")));
    }
}
