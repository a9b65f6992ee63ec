//! Whole-folder encryption and decryption
//!
//! Files are processed one at a time in name order. Each file is replaced
//! atomically, so an interrupted run leaves a prefix of the folder changed
//! and the rest untouched, never a half-written file.
//!
//! Encryption stops at the first failing file. Files encrypted before the
//! failure stay encrypted (there is no rollback), and the key artifacts are
//! still written so that they can be decrypted again.
//!
//! Decryption authenticates the password before touching any file, then
//! keeps going past individual file failures and reports each one.

use crate::codec;
use crate::config::VaultConfig;
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::fsutil;
use crate::keystore::{VaultKey, VaultKeyStore};
use crate::lock::FolderLock;
use crate::scan;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Idle,
    Scanning,
    Encrypting,
    Decrypting,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VaultState::Idle => "idle",
            VaultState::Scanning => "scanning",
            VaultState::Encrypting => "encrypting",
            VaultState::Decrypting => "decrypting",
            VaultState::Finalizing => "finalizing",
            VaultState::Done => "done",
            VaultState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Succeeded,
    /// Not attempted.
    Skipped(String),
    Failed(VaultError),
}

#[derive(Debug)]
pub struct FileResult {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Per-file outcomes of one folder operation.
#[derive(Debug)]
pub struct BatchReport {
    pub state: VaultState,
    pub files: Vec<FileResult>,
}

impl BatchReport {
    fn new() -> Self {
        Self {
            state: VaultState::Idle,
            files: Vec::new(),
        }
    }

    fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        self.files.push(FileResult { path, outcome });
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.state == VaultState::Done
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

/// Runs folder operations and tracks their state.
#[derive(Debug)]
pub struct VaultManager {
    config: VaultConfig,
    state: VaultState,
}

impl VaultManager {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            state: VaultState::Idle,
        }
    }

    /// State reached by the most recent operation.
    pub fn state(&self) -> VaultState {
        self.state
    }

    fn transition(&mut self, to: VaultState) {
        debug!(from = %self.state, to = %to, "vault state change");
        self.state = to;
    }

    /// Encrypt every file in `folder` under a fresh key protected by
    /// `password`.
    ///
    /// Setup failures (folder locked, already a vault) are returned as
    /// errors before any file is touched. A per-file failure ends the batch
    /// with a report in the `Failed` state.
    pub fn encrypt_folder(&mut self, folder: &Path, password: &[u8]) -> Result<BatchReport> {
        self.state = VaultState::Idle;
        let result = self.run_encrypt(folder, password);
        if result.is_err() {
            self.transition(VaultState::Failed);
        }
        result
    }

    /// Decrypt every file in `folder`.
    ///
    /// A wrong password or missing artifact is returned as an error before
    /// any file is touched. Per-file failures are recorded and the batch
    /// continues; the report ends in `Failed` if any file failed.
    pub fn decrypt_folder(&mut self, folder: &Path, password: &[u8]) -> Result<BatchReport> {
        self.state = VaultState::Idle;
        let result = self.run_decrypt(folder, password);
        if result.is_err() {
            self.transition(VaultState::Failed);
        }
        result
    }

    fn run_encrypt(&mut self, folder: &Path, password: &[u8]) -> Result<BatchReport> {
        ensure_folder(folder)?;
        let _lock = FolderLock::acquire(folder)?;
        let store = VaultKeyStore::new(self.config.kdf);

        self.transition(VaultState::Scanning);
        if store.is_initialized(folder) {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::AlreadyInitialized,
                format!("{} is already encrypted", folder.display()),
            ));
        }
        let files = scan::list_files(folder)?;
        let key = VaultKey::generate();

        self.transition(VaultState::Encrypting);
        let mut report = BatchReport::new();
        let mut aborted = false;
        for path in files {
            if aborted {
                report.record(
                    path,
                    FileOutcome::Skipped("not attempted after an earlier failure".to_string()),
                );
                continue;
            }
            match encrypt_file(&key, &path) {
                Ok(()) => {
                    debug!(path = %path.display(), "encrypted");
                    report.record(path, FileOutcome::Succeeded);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "encryption failed; stopping batch");
                    report.record(path, FileOutcome::Failed(e));
                    aborted = true;
                }
            }
        }

        self.transition(VaultState::Finalizing);
        if let Err(e) = store.create_with_key(folder, &key, password) {
            error!(
                folder = %folder.display(),
                encrypted = report.succeeded(),
                "failed to persist vault key; encrypted files cannot be recovered"
            );
            return Err(e.with_context("failed to write vault key artifacts"));
        }

        let end = if aborted {
            VaultState::Failed
        } else {
            VaultState::Done
        };
        self.transition(end);
        report.state = end;
        info!(
            folder = %folder.display(),
            encrypted = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "encryption finished"
        );
        Ok(report)
    }

    fn run_decrypt(&mut self, folder: &Path, password: &[u8]) -> Result<BatchReport> {
        ensure_folder(folder)?;
        let _lock = FolderLock::acquire(folder)?;
        let store = VaultKeyStore::new(self.config.kdf);

        self.transition(VaultState::Scanning);
        let files = scan::list_files(folder)?;
        let key = store.unlock(folder, password)?;

        self.transition(VaultState::Decrypting);
        let mut report = BatchReport::new();
        for path in files {
            match decrypt_file(&key, &path) {
                Ok(()) => {
                    debug!(path = %path.display(), "decrypted");
                    report.record(path, FileOutcome::Succeeded);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "decryption failed; continuing");
                    report.record(path, FileOutcome::Failed(e));
                }
            }
        }

        self.transition(VaultState::Finalizing);
        let end = if report.failed() == 0 {
            store.remove(folder)?;
            VaultState::Done
        } else {
            info!(
                folder = %folder.display(),
                "keeping vault artifacts so the failed files can be retried"
            );
            VaultState::Failed
        };
        self.transition(end);
        report.state = end;
        info!(
            folder = %folder.display(),
            decrypted = report.succeeded(),
            failed = report.failed(),
            "decryption finished"
        );
        Ok(report)
    }
}

fn ensure_folder(folder: &Path) -> Result<()> {
    if folder.is_dir() {
        Ok(())
    } else {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("{} is not a directory", folder.display()),
        ))
    }
}

fn encrypt_file(key: &VaultKey, path: &Path) -> Result<()> {
    let plaintext = Zeroizing::new(fsutil::read_file(path)?);
    let sealed = codec::seal(key, &plaintext)?;
    fsutil::replace_file(path, &sealed)
}

fn decrypt_file(key: &VaultKey, path: &Path) -> Result<()> {
    let sealed = fsutil::read_file(path)?;
    let plaintext = codec::open(key, &sealed)
        .map_err(|e| e.with_context(format!("failed to decrypt {}", path.display())))?;
    fsutil::replace_file(path, &plaintext)
}
