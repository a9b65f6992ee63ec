//! Filesystem helpers shared by the vault and the duplicate index
//!
//! All writes go through a temporary file in the destination directory that
//! is flushed, fsync()ed and then renamed over the target, so a crash leaves
//! either the old contents or the new contents, never a partial file.

use crate::error::{ErrorCategory, Result, VaultError};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Read a whole file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| read_error(path, e))
}

/// Atomically replace the contents of an existing file, keeping its
/// permissions.
pub fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let permissions = fs::metadata(path)
        .map_err(|e| read_error(path, e))?
        .permissions();
    let temp_file = write_temp(path, contents)?;
    temp_file
        .as_file()
        .set_permissions(permissions)
        .map_err(|e| {
            VaultError::io(ErrorCategory::Internal, "failed to set tempfile permissions", e)
        })?;
    temp_file.persist(path).map_err(|e| {
        VaultError::io(
            ErrorCategory::Internal,
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

/// Atomically create a new file readable only by its owner (0o600 on Unix).
///
/// Fails if `path` already exists.
pub fn create_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_file = write_temp(path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                VaultError::io(ErrorCategory::Internal, "failed to set tempfile permissions", e)
            })?;
    }

    temp_file.persist_noclobber(path).map_err(|e| {
        let category = if e.error.kind() == io::ErrorKind::AlreadyExists {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        VaultError::io(
            category,
            format!("failed to create {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

/// Remove a file, treating an already missing file as success.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VaultError::io(
            ErrorCategory::Internal,
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

/// Write `contents` to a synced temporary file next to `path`.
fn write_temp(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir)
        .map_err(|e| VaultError::io(ErrorCategory::Internal, "failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| VaultError::io(ErrorCategory::Internal, "failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| VaultError::io(ErrorCategory::Internal, "failed to flush tempfile", e))?;
    temp_file.as_file().sync_all().map_err(|e| {
        VaultError::io(
            ErrorCategory::Internal,
            "failed to sync file prior to rename",
            e,
        )
    })?;
    Ok(temp_file)
}

pub(crate) fn read_error(path: &Path, err: io::Error) -> VaultError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    VaultError::io(
        category,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_replace_file_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"old").unwrap();

        replace_file(&path, b"new contents").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new contents");
        // No temporary files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_replace_file_keeps_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        replace_file(&path, b"new").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_replace_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = replace_file(&dir.path().join("missing"), b"x").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    #[cfg(unix)]
    fn test_create_private_file_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        create_private_file(&path, b"s").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_create_private_file_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        fs::write(&path, b"original").unwrap();

        assert!(create_private_file(&path, b"replacement").is_err());
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn test_remove_file_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone");
        remove_file_if_exists(&path).unwrap();
        fs::write(&path, b"x").unwrap();
        remove_file_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
