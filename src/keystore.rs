//! Vault key generation, password verification and key storage
//!
//! A vaulted folder carries two sibling artifacts:
//!
//! - `password.txt`: a salted scrypt verifier. The password itself is never
//!   written anywhere.
//! - `encryption_key.txt`: the random vault key, sealed with the envelope
//!   codec under a key-encryption key derived from the password (scrypt,
//!   separate salt).
//!
//! Both are armored single-line text files. The scrypt parameters used at
//! creation time are stored inside each artifact so that unlocking never
//! depends on the current configuration.

use crate::armor;
use crate::codec;
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::fsutil;
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use std::fmt;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// File holding the password-wrapped vault key.
pub const KEY_FILE: &str = "encryption_key.txt";

/// File holding the password verifier.
pub const VERIFIER_FILE: &str = "password.txt";

/// Length of the vault key in bytes
pub const KEY_LEN: usize = 32;

/// Length of scrypt salts in bytes
const SALT_LEN: usize = 16;

/// Length of the serialized KDF parameters (log_n, r, p)
const PARAMS_LEN: usize = 1 + 4 + 4;

/// Upper bounds on stored scrypt parameters. Artifacts are read before
/// anything authenticates them, so larger values are rejected instead of
/// attempting the allocation.
const MAX_LOG_N: u8 = 22;
const MAX_R: u32 = 32;
const MAX_P: u32 = 16;

const KEY_LABEL: &str = "foldervault-key";
const VERIFIER_LABEL: &str = "foldervault-verifier";

/// Symmetric key for one vault. Zeroed on drop, never cloned, never printed.
pub struct VaultKey(Zeroizing<[u8; KEY_LEN]>);

impl VaultKey {
    /// Generate a fresh random key from the operating system RNG.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(key.as_mut_slice());
        Self(key)
    }

    pub(crate) fn from_bytes(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

/// scrypt cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost N
    pub log_n: u8,
    /// block size
    pub r: u32,
    /// parallelization
    pub p: u32,
}

impl Default for KdfParams {
    /// N = 32768, r = 8, p = 1.
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. NEVER use these for real data.
    pub fn fast_insecure() -> Self {
        Self {
            log_n: 4,
            r: 8,
            p: 1,
        }
    }

    fn to_bytes(self) -> [u8; PARAMS_LEN] {
        let mut out = [0u8; PARAMS_LEN];
        out[0] = self.log_n;
        out[1..5].copy_from_slice(&self.r.to_be_bytes());
        out[5..9].copy_from_slice(&self.p.to_be_bytes());
        out
    }

    fn from_bytes(bytes: &[u8; PARAMS_LEN]) -> Self {
        let mut r = [0u8; 4];
        let mut p = [0u8; 4];
        r.copy_from_slice(&bytes[1..5]);
        p.copy_from_slice(&bytes[5..9]);
        Self {
            log_n: bytes[0],
            r: u32::from_be_bytes(r),
            p: u32::from_be_bytes(p),
        }
    }

    /// Derive a 32-byte key from a password and salt.
    fn derive(&self, password: &[u8], salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = Params::new(self.log_n, self.r, self.p, KEY_LEN).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::KeyDerivation,
                format!("invalid scrypt parameters {:?}", self),
                e,
            )
        })?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt(password, salt, &params, key.as_mut_slice()).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyDerivation,
                "scrypt key derivation failed",
                e,
            )
        })?;
        Ok(key)
    }
}

/// Salted one-way representation of a password.
pub struct PasswordVerifier {
    params: KdfParams,
    salt: [u8; SALT_LEN],
    hash: Zeroizing<[u8; KEY_LEN]>,
}

impl PasswordVerifier {
    /// Derive a verifier for `password` with a fresh random salt.
    pub fn derive(password: &[u8], params: KdfParams) -> Result<Self> {
        let salt = random_salt();
        let hash = params.derive(password, &salt)?;
        Ok(Self { params, salt, hash })
    }

    /// Recompute the hash for `password` and compare in constant time.
    pub fn verify(&self, password: &[u8]) -> Result<bool> {
        let candidate = self.params.derive(password, &self.salt)?;
        Ok(candidate.as_slice().ct_eq(self.hash.as_slice()).into())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PARAMS_LEN + SALT_LEN + KEY_LEN);
        out.extend_from_slice(&self.params.to_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(self.hash.as_slice());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PARAMS_LEN + SALT_LEN + KEY_LEN {
            return Err(artifact_invalid(format!(
                "verifier has length {}, expected {}",
                bytes.len(),
                PARAMS_LEN + SALT_LEN + KEY_LEN
            )));
        }
        let (params, rest) = split_params(bytes)?;
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&rest[..SALT_LEN]);
        let mut hash = Zeroizing::new([0u8; KEY_LEN]);
        hash.copy_from_slice(&rest[SALT_LEN..]);
        Ok(Self { params, salt, hash })
    }
}

/// Creates and unlocks the key artifacts of a vaulted folder.
#[derive(Debug, Clone, Default)]
pub struct VaultKeyStore {
    params: KdfParams,
}

impl VaultKeyStore {
    /// `params` are used for newly created artifacts only.
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn key_path(folder: &Path) -> PathBuf {
        folder.join(KEY_FILE)
    }

    pub fn verifier_path(folder: &Path) -> PathBuf {
        folder.join(VERIFIER_FILE)
    }

    /// True if either artifact is present.
    pub fn is_initialized(&self, folder: &Path) -> bool {
        Self::key_path(folder).exists() || Self::verifier_path(folder).exists()
    }

    /// Generate a fresh key and persist it together with a verifier for
    /// `password`.
    pub fn create(&self, folder: &Path, password: &[u8]) -> Result<VaultKey> {
        let key = VaultKey::generate();
        self.create_with_key(folder, &key, password)?;
        Ok(key)
    }

    /// Persist an already generated key. Refuses to overwrite existing
    /// artifacts.
    pub(crate) fn create_with_key(
        &self,
        folder: &Path,
        key: &VaultKey,
        password: &[u8],
    ) -> Result<()> {
        if self.is_initialized(folder) {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::AlreadyInitialized,
                format!(
                    "{} already contains vault artifacts; refusing to replace the existing key",
                    folder.display()
                ),
            ));
        }

        let verifier = PasswordVerifier::derive(password, self.params)?;

        let kek_salt = random_salt();
        let kek = VaultKey::from_bytes(self.params.derive(password, &kek_salt)?);
        let mut wrapped = Vec::with_capacity(PARAMS_LEN + SALT_LEN + codec::HEADER_LEN + KEY_LEN);
        wrapped.extend_from_slice(&self.params.to_bytes());
        wrapped.extend_from_slice(&kek_salt);
        wrapped.extend_from_slice(&codec::seal(&kek, key.as_bytes())?);

        write_artifacts(folder, &verifier.to_bytes(), &wrapped)?;
        debug!(folder = %folder.display(), "vault artifacts written");
        Ok(())
    }

    /// Verify `password` and load the vault key.
    ///
    /// The key artifact is only read after the password has been verified.
    pub fn unlock(&self, folder: &Path, password: &[u8]) -> Result<VaultKey> {
        let verifier_path = Self::verifier_path(folder);
        let key_path = Self::key_path(folder);
        for path in [&verifier_path, &key_path] {
            if !path.exists() {
                return Err(VaultError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::MissingArtifact,
                    format!("vault artifact not found at {}", path.display()),
                ));
            }
        }

        let verifier = PasswordVerifier::from_bytes(&read_artifact(&verifier_path, VERIFIER_LABEL)?)
            .map_err(|e| e.with_context(format!("failed to load {}", verifier_path.display())))?;
        if !verifier.verify(password)? {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::WrongPassword,
                "incorrect password",
            ));
        }
        debug!(folder = %folder.display(), "password verified");

        let wrapped = read_artifact(&key_path, KEY_LABEL)?;
        let (params, rest) = split_params(&wrapped)?;
        if rest.len() < SALT_LEN {
            return Err(artifact_invalid("key file likely truncated while reading salt"));
        }
        let mut kek_salt = [0u8; SALT_LEN];
        kek_salt.copy_from_slice(&rest[..SALT_LEN]);
        let kek = VaultKey::from_bytes(params.derive(password, &kek_salt)?);

        let raw = codec::open(&kek, &rest[SALT_LEN..])
            .map_err(|e| e.with_context(format!("failed to unwrap {}", key_path.display())))?;
        if raw.len() != KEY_LEN {
            return Err(artifact_invalid(format!(
                "unwrapped key has length {}, expected {}",
                raw.len(),
                KEY_LEN
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&raw);
        Ok(VaultKey::from_bytes(key))
    }

    /// Delete both artifacts, returning the folder to a plain state.
    pub fn remove(&self, folder: &Path) -> Result<()> {
        for path in [Self::key_path(folder), Self::verifier_path(folder)] {
            fsutil::remove_file_if_exists(&path)?;
        }
        debug!(folder = %folder.display(), "vault artifacts removed");
        Ok(())
    }
}

fn read_artifact(path: &Path, label: &str) -> Result<Vec<u8>> {
    let bytes = fsutil::read_file(path)?;
    let text = String::from_utf8(bytes).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::ArtifactInvalid,
            format!("{} is not valid UTF-8", path.display()),
            e,
        )
    })?;
    armor::unwrap(label, &text)
        .map_err(|e| e.with_context(format!("failed to read {}", path.display())))
}

/// Write the verifier, then the wrapped key. A verifier without its key
/// would make the folder look initialized while being unlockable, so it is
/// removed again if the key cannot be written.
fn write_artifacts(folder: &Path, verifier: &[u8], wrapped: &[u8]) -> Result<()> {
    let verifier_path = VaultKeyStore::verifier_path(folder);
    let armored_verifier = armor::wrap(VERIFIER_LABEL, verifier);
    fsutil::create_private_file(&verifier_path, armored_verifier.as_bytes())?;

    let key_path = VaultKeyStore::key_path(folder);
    let armored_key = armor::wrap(KEY_LABEL, wrapped);
    if let Err(e) = fsutil::create_private_file(&key_path, armored_key.as_bytes()) {
        if let Err(cleanup) = fsutil::remove_file_if_exists(&verifier_path) {
            warn!(
                path = %verifier_path.display(),
                error = %cleanup.chain_message(),
                "failed to remove verifier after key write failed"
            );
        }
        return Err(e);
    }
    Ok(())
}

fn split_params(bytes: &[u8]) -> Result<(KdfParams, &[u8])> {
    if bytes.len() < PARAMS_LEN {
        return Err(artifact_invalid("artifact likely truncated while reading parameters"));
    }
    let (head, rest) = bytes.split_at(PARAMS_LEN);
    let mut params = [0u8; PARAMS_LEN];
    params.copy_from_slice(head);
    let params = KdfParams::from_bytes(&params);
    if params.log_n > MAX_LOG_N || params.r > MAX_R || params.p > MAX_P {
        return Err(artifact_invalid(format!(
            "stored scrypt parameters {:?} exceed the supported maximum",
            params
        )));
    }
    Ok((params, rest))
}

fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn artifact_invalid(msg: impl Into<String>) -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::ArtifactInvalid, msg)
}
