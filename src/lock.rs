//! Folder-level advisory lock
//!
//! A lock is a `.foldervault.lock` file created with `create_new`, so only
//! one process can hold it. It records the owner's PID for humans cleaning
//! up after a crash. The guard deletes the file when dropped.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lock file inside a locked folder.
pub const LOCK_FILE: &str = ".foldervault.lock";

#[derive(Debug)]
pub struct FolderLock {
    path: PathBuf,
}

impl FolderLock {
    /// Take the lock on `folder`, failing with [`ErrorKind::Locked`] if
    /// another process holds it.
    pub fn acquire(folder: &Path) -> Result<Self> {
        let path = folder.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(VaultError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Locked,
                    format!(
                        "{} is in use by another foldervault process \
                         (remove {} if that process is gone)",
                        folder.display(),
                        path.display()
                    ),
                    e,
                ));
            }
            Err(e) => {
                return Err(VaultError::io(
                    ErrorCategory::User,
                    format!("failed to create lock file {}", path.display()),
                    e,
                ));
            }
        };

        // From here on the guard owns the file and cleans it up on failure.
        let lock = Self { path };
        writeln!(file, "{}", std::process::id()).map_err(|e| {
            VaultError::io(
                ErrorCategory::Internal,
                format!("failed to write lock file {}", lock.path.display()),
                e,
            )
        })?;
        debug!(lock = %lock.path.display(), "folder locked");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(lock = %self.path.display(), "folder unlocked"),
            Err(e) => warn!(lock = %self.path.display(), error = %e, "failed to remove lock file"),
        }
    }
}
