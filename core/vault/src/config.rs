//! Vault configuration and persisted layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keepsafe_common::{Error, Result};
use keepsafe_crypto::KdfParams;
use keepsafe_storage::StorageProvider;

/// Configuration file name in vault root.
pub const CONFIG_FILENAME: &str = "vault.config";

/// Encrypted index object name.
pub const INDEX_FILENAME: &str = "index.enc";

/// Raw master seed sidecar.
pub const MASTER_SEED_FILENAME: &str = "master.key";

/// Raw KDF salt sidecar.
pub const SALT_FILENAME: &str = "salt.key";

/// PKCS#8 PEM private key sidecar.
pub const KEYPAIR_FILENAME: &str = "keypair.pem";

/// Extension of encrypted payload objects.
pub const OBJECT_EXTENSION: &str = "enc";

/// Vault format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current vault format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Plaintext vault configuration.
///
/// Stored at the vault root. Holds nothing secret: the KDF cost and key
/// size are properties of the vault, so every opener derives keys the same
/// way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault format version.
    pub version: VaultVersion,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// RSA modulus size for generated keypairs.
    pub key_bits: usize,
    /// Vault creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last key rotation or configuration change.
    pub modified_at: DateTime<Utc>,
}

impl VaultConfig {
    /// Create a new vault configuration.
    pub fn new(kdf_params: KdfParams, key_bits: usize) -> Self {
        let now = Utc::now();
        Self {
            version: VaultVersion::CURRENT,
            kdf_params,
            key_bits,
            created_at: now,
            modified_at: now,
        }
    }

    /// Record a modification.
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Fail unless this build can read the vault.
    pub fn check_compatible(&self) -> Result<()> {
        if !self.version.is_compatible() {
            return Err(Error::Vault(format!(
                "Incompatible vault version {}.{} (supported: {}.x)",
                self.version.major,
                self.version.minor,
                VaultVersion::CURRENT.major
            )));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Read and validate the configuration object.
    ///
    /// # Errors
    /// - `Vault` if the vault has no configuration or an incompatible version
    /// - `Serialization` if the document is corrupt
    pub fn load(provider: &dyn StorageProvider) -> Result<Self> {
        let bytes = match provider.download(CONFIG_FILENAME) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return Err(Error::Vault("Vault is not initialized".to_string()))
            }
            Err(e) => return Err(e),
        };

        let json = std::str::from_utf8(&bytes)
            .map_err(|e| Error::Serialization(format!("{} is not UTF-8: {}", CONFIG_FILENAME, e)))?;
        let config = Self::from_json(json)?;
        config.check_compatible()?;
        Ok(config)
    }

    /// Write the configuration object.
    pub fn store(&self, provider: &dyn StorageProvider) -> Result<()> {
        provider.upload(CONFIG_FILENAME, self.to_json()?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsafe_storage::MemoryProvider;

    #[test]
    fn test_vault_version_compatibility() {
        let current = VaultVersion::CURRENT;
        assert!(current.is_compatible());

        let incompatible = VaultVersion { major: 2, minor: 0 };
        assert!(!incompatible.is_compatible());
    }

    #[test]
    fn test_config_roundtrip_through_provider() {
        let provider = MemoryProvider::new();
        let config = VaultConfig::new(KdfParams::moderate(), 2048);

        config.store(&provider).unwrap();
        let restored = VaultConfig::load(&provider).unwrap();

        assert_eq!(restored, config);
    }

    #[test]
    fn test_missing_config_means_uninitialized() {
        let provider = MemoryProvider::new();

        assert!(matches!(
            VaultConfig::load(&provider),
            Err(Error::Vault(_))
        ));
    }

    #[test]
    fn test_incompatible_version_is_refused() {
        let provider = MemoryProvider::new();
        let mut config = VaultConfig::new(KdfParams::interactive(), 2048);
        config.version = VaultVersion { major: 9, minor: 0 };
        config.store(&provider).unwrap();

        assert!(matches!(
            VaultConfig::load(&provider),
            Err(Error::Vault(_))
        ));
    }

    #[test]
    fn test_corrupt_config() {
        let provider = MemoryProvider::new();
        provider.upload(CONFIG_FILENAME, b"{not json").unwrap();

        assert!(matches!(
            VaultConfig::load(&provider),
            Err(Error::Serialization(_))
        ));
    }
}
