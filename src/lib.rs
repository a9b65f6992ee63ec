//! foldervault - password-protected folder encryption and duplicate cleanup
//!
//! - [`vault::VaultManager`] encrypts or decrypts every file of a folder
//!   under a random key kept in password-protected artifacts
//!   ([`keystore::VaultKeyStore`]), one authenticated envelope per file
//!   ([`codec`]).
//! - [`scan`] and [`dedupe`] find exact and perceptual duplicates and plan
//!   their removal.

#![forbid(unsafe_code)]

pub mod armor;
pub mod codec;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod fsutil;
pub mod hasher;
pub mod keystore;
pub mod lock;
pub mod password;
pub mod scan;
pub mod vault;

pub use config::VaultConfig;
pub use error::{ErrorCategory, ErrorKind, Result, VaultError};
pub use keystore::{KdfParams, VaultKey, VaultKeyStore};
pub use vault::{BatchReport, FileOutcome, VaultManager, VaultState};
