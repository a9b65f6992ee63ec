//! Versioned armoring for vault artifact files
//!
//! Artifacts are small binary records stored as a single line of text:
//!
//! `{label}1:{base64url-no-padding}`
//!
//! The label names the artifact type so that a key file can never be
//! mistaken for a verifier file (and vice versa). The armored form is free
//! of whitespace and safe to copy around by hand.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Current armor version marker appended to the label.
const VERSION: &str = "1:";

/// Wrap bytes in armor, returning the armored string.
pub fn wrap(label: &str, body: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(body);
    format!("{}{}{}", label, VERSION, encoded)
}

/// Unwrap an armored string, returning the original bytes.
///
/// Surrounding whitespace is ignored so that artifacts edited by hand (and
/// saved with a trailing newline) still load.
pub fn unwrap(label: &str, armored: &str) -> Result<Vec<u8>> {
    let armored = armored.trim();

    let Some(rest) = armored.strip_prefix(label) else {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArtifactInvalid,
            format!("input unrecognized as {} data", label),
        ));
    };

    if let Some(encoded) = rest.strip_prefix(VERSION) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArtifactInvalid,
                format!("base64 decoding failed: {}", e),
                e,
            )
        })
    } else {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedVersion,
            format!("input claims to be {}, but not a version we support", label),
        ))
    }
}
