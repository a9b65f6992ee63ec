//! Runtime configuration

use crate::dedupe::Threshold;
use crate::keystore::KdfParams;

/// Environment variable holding the `tracing` filter for the binary.
pub const LOG_ENV: &str = "FOLDERVAULT_LOG";

/// Tunables shared by the vault and duplicate operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultConfig {
    /// scrypt cost for newly created vaults. Existing vaults always unlock
    /// with the parameters stored in their artifacts.
    pub kdf: KdfParams,
    /// Similarity threshold for duplicate detection.
    pub threshold: Threshold,
}

impl VaultConfig {
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }
}
