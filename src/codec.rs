//! Per-file authenticated encryption
//!
//! Every vaulted file is replaced by a self-contained envelope sealed with
//! NaCl secretbox (XSalsa20Poly1305) under the vault key:
//!
//! - magic: 3 bytes (`FVE`)
//! - version: 1 byte
//! - nonce: 24 bytes (random per call)
//! - tag: 16 bytes (Poly1305 MAC)
//! - ciphertext: remaining bytes, same length as the plaintext
//!
//! The 24-byte XSalsa20 nonce is large enough to be drawn at random for
//! every file without tracking previously used values.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::keystore::VaultKey;
use crypto_secretbox::aead::{AeadInPlace, KeyInit, Tag};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Magic bytes identifying an envelope
const MAGIC: &[u8; 3] = b"FVE";

/// Envelope format version written by this build
pub const FORMAT_VERSION: u8 = 1;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Length of everything preceding the ciphertext
pub const HEADER_LEN: usize = MAGIC.len() + 1 + NONCE_LEN + TAG_LEN;

/// A sealed file: version tag, nonce, ciphertext and authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    version: u8,
    nonce: [u8; NONCE_LEN],
    tag: [u8; TAG_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        output.extend_from_slice(MAGIC);
        output.push(self.version);
        output.extend_from_slice(&self.nonce);
        output.extend_from_slice(&self.tag);
        output.extend_from_slice(&self.ciphertext);
        output
    }

    /// Parse the on-disk layout. This only checks structure; authenticity
    /// is established by [`decrypt`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(rest) = bytes.strip_prefix(MAGIC.as_slice()) else {
            return Err(malformed("input unrecognized as a foldervault envelope"));
        };

        let Some((&version, rest)) = rest.split_first() else {
            return Err(malformed("input likely truncated while reading version"));
        };
        if version != FORMAT_VERSION {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedVersion,
                format!("envelope version {} is not a version we support", version),
            ));
        }

        if rest.len() < NONCE_LEN {
            return Err(malformed("input likely truncated while reading nonce"));
        }
        let (nonce, rest) = rest.split_at(NONCE_LEN);

        if rest.len() < TAG_LEN {
            return Err(malformed("input likely truncated while reading tag"));
        }
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut envelope = Envelope {
            version,
            nonce: [0u8; NONCE_LEN],
            tag: [0u8; TAG_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        envelope.nonce.copy_from_slice(nonce);
        envelope.tag.copy_from_slice(tag);
        Ok(envelope)
    }
}

/// Encrypt plaintext under `key` with a fresh random nonce.
pub fn encrypt(key: &VaultKey, plaintext: &[u8]) -> Result<Envelope> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_with_nonce(key, plaintext, &nonce)
}

/// Encrypt plaintext under `key` using the provided nonce.
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which generates a
/// random nonce.
pub fn encrypt_with_nonce(
    key: &VaultKey,
    plaintext: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Result<Envelope> {
    let cipher = cipher_for(key)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&Nonce::from(*nonce), b"", &mut buffer)
        .map_err(|_| VaultError::new(ErrorCategory::Internal, "secretbox seal failed"))?;

    let mut envelope = Envelope {
        version: FORMAT_VERSION,
        nonce: *nonce,
        tag: [0u8; TAG_LEN],
        ciphertext: buffer,
    };
    envelope.tag.copy_from_slice(tag.as_slice());
    Ok(envelope)
}

/// Decrypt an envelope, returning the plaintext only if authentication
/// succeeds.
pub fn decrypt(key: &VaultKey, envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = cipher_for(key)?;

    let mut buffer = Zeroizing::new(envelope.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            &Nonce::from(envelope.nonce),
            b"",
            buffer.as_mut_slice(),
            Tag::<XSalsa20Poly1305>::from_slice(&envelope.tag),
        )
        .map_err(|_| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::TamperedOrWrongKey,
                "corrupt input, tampered-with data, or wrong key",
            )
        })?;

    Ok(buffer)
}

/// Parse and decrypt in one step.
pub fn open(key: &VaultKey, bytes: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let envelope = Envelope::from_bytes(bytes)?;
    decrypt(key, &envelope)
}

/// Encrypt and serialize in one step.
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    Ok(encrypt(key, plaintext)?.to_bytes())
}

fn cipher_for(key: &VaultKey) -> Result<XSalsa20Poly1305> {
    XSalsa20Poly1305::new_from_slice(key.as_bytes()).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::TamperedOrWrongKey,
            "vault key has an invalid length",
            e,
        )
    })
}

fn malformed(msg: &str) -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::TamperedOrWrongKey, msg)
}
