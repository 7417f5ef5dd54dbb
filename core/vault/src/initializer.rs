//! Idempotent vault bootstrap.

use std::path::Path;
use tracing::{debug, info};

use crate::config::{VaultConfig, CONFIG_FILENAME, INDEX_FILENAME};
use crate::index::Index;
use crate::keystore;
use keepsafe_common::{Error, Result};
use keepsafe_crypto::{EnvelopeCipher, KdfParams, DEFAULT_KEY_BITS};
use keepsafe_storage::{LocalProvider, StorageProvider};

/// Bootstrap progress, as read from the objects present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Nothing of a vault exists.
    Uninitialized,
    /// Some but not all vault objects exist.
    Initializing,
    /// Config, key material and index all exist.
    Ready,
}

/// Creates whatever parts of a vault are missing.
///
/// Running it again on a ready vault does nothing. Existing objects are
/// never overwritten.
#[derive(Debug, Clone)]
pub struct VaultInitializer {
    kdf_params: KdfParams,
    key_bits: usize,
}

impl VaultInitializer {
    /// Initializer with interactive KDF parameters and default key size.
    pub fn new() -> Self {
        Self {
            kdf_params: KdfParams::default(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// KDF parameters recorded for a new vault.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    /// RSA modulus size for a new vault.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Report the state of the vault in `base_path` without changing it.
    ///
    /// # Errors
    /// - `InvalidBasePath` if the path exists but is not a directory
    pub fn state(&self, base_path: impl AsRef<Path>) -> Result<InitState> {
        let base_path = base_path.as_ref();
        if !base_path.exists() {
            return Ok(InitState::Uninitialized);
        }
        let provider = LocalProvider::new(base_path)?;
        self.state_of(&provider)
    }

    /// Report the state of the vault in `provider`.
    pub fn state_of(&self, provider: &dyn StorageProvider) -> Result<InitState> {
        let mut present = 0;
        let mut total = 0;
        for name in [CONFIG_FILENAME, INDEX_FILENAME]
            .into_iter()
            .chain(keystore::SIDECARS)
        {
            total += 1;
            if provider.exists(name)? {
                present += 1;
            }
        }

        Ok(match present {
            0 => InitState::Uninitialized,
            n if n == total => InitState::Ready,
            _ => InitState::Initializing,
        })
    }

    /// Create the base directory and every missing vault object.
    ///
    /// # Errors
    /// - `InvalidBasePath` if the path exists but is not a directory
    /// - `Vault` if an index exists but key material or config is missing
    pub fn initialize(&self, base_path: impl AsRef<Path>, password: &[u8]) -> Result<()> {
        let provider = LocalProvider::new(base_path.as_ref())?;
        self.initialize_provider(&provider, password)
    }

    /// Create every missing vault object in `provider`.
    ///
    /// If a config already exists its KDF parameters and key size win over
    /// this initializer's.
    pub fn initialize_provider(&self, provider: &dyn StorageProvider, password: &[u8]) -> Result<()> {
        if password.is_empty() {
            return Err(Error::InvalidInput("Password cannot be empty".to_string()));
        }

        let state = self.state_of(provider)?;
        if state == InitState::Ready {
            debug!("Vault already initialized");
            return Ok(());
        }

        let index_exists = provider.exists(INDEX_FILENAME)?;
        let missing = keystore::missing_sidecars(provider)?;
        if index_exists && !missing.is_empty() {
            return Err(Error::Vault(format!(
                "Index exists but key material is missing ({}); refusing to regenerate keys",
                missing.join(", ")
            )));
        }

        let config_exists = provider.exists(CONFIG_FILENAME)?;
        if index_exists && !config_exists {
            return Err(Error::Vault(format!(
                "Index exists but {} is missing; refusing to guess its KDF parameters",
                CONFIG_FILENAME
            )));
        }

        let config = if config_exists {
            VaultConfig::load(provider)?
        } else {
            let config = VaultConfig::new(self.kdf_params.clone(), self.key_bits);
            config.store(provider)?;
            debug!(key_bits = config.key_bits, "Config written");
            config
        };

        let material = keystore::ensure_material(provider, config.key_bits)?;

        if !index_exists {
            let session = EnvelopeCipher::new(material, config.kdf_params.clone()).session(password)?;
            Index::create(provider, &session)?;
        }

        info!(provider = provider.name(), "Vault initialized");
        Ok(())
    }
}

impl Default for VaultInitializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KEYPAIR_FILENAME, SALT_FILENAME};
    use crate::test_support::{initializer, shared_material};
    use crate::vault::Vault;
    use keepsafe_common::VaultPath;
    use keepsafe_storage::MemoryProvider;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn seeded_provider() -> MemoryProvider {
        let provider = MemoryProvider::new();
        keystore::store_material(&provider, shared_material()).unwrap();
        provider
    }

    #[test]
    fn test_initialize_on_disk() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("vault");
        let init = initializer();

        assert_eq!(init.state(&base).unwrap(), InitState::Uninitialized);
        init.initialize(&base, b"pw").unwrap();
        assert_eq!(init.state(&base).unwrap(), InitState::Ready);

        for name in [CONFIG_FILENAME, INDEX_FILENAME, KEYPAIR_FILENAME, SALT_FILENAME] {
            assert!(base.join(name).is_file(), "{} missing", name);
        }
        assert!(Vault::open(&base, b"pw").unwrap().list_files().children.is_empty());
    }

    #[test]
    fn test_rerun_is_noop() {
        let provider = seeded_provider();
        let init = initializer();
        init.initialize_provider(&provider, b"pw").unwrap();

        let shared: Arc<dyn StorageProvider> = Arc::new(provider.clone());
        let mut vault = Vault::open_with_provider(shared, b"pw").unwrap();
        vault.add_file(b"keep me", &VaultPath::parse("f").unwrap()).unwrap();
        let before = provider.list().unwrap();

        init.initialize_provider(&provider, b"pw").unwrap();
        assert_eq!(provider.list().unwrap(), before);
    }

    #[test]
    fn test_partial_state_is_completed() {
        let provider = seeded_provider();
        let init = initializer();
        assert_eq!(init.state_of(&provider).unwrap(), InitState::Initializing);

        init.initialize_provider(&provider, b"pw").unwrap();

        assert_eq!(init.state_of(&provider).unwrap(), InitState::Ready);
        let loaded = keystore::load_material(&provider).unwrap();
        assert_eq!(
            loaded.keypair().fingerprint().unwrap(),
            shared_material().keypair().fingerprint().unwrap()
        );
    }

    #[test]
    fn test_refuses_index_without_keys() {
        let provider = seeded_provider();
        let init = initializer();
        init.initialize_provider(&provider, b"pw").unwrap();
        provider.delete(KEYPAIR_FILENAME).unwrap();

        assert!(matches!(
            init.initialize_provider(&provider, b"pw"),
            Err(Error::Vault(_))
        ));
        assert!(!provider.exists(KEYPAIR_FILENAME).unwrap());
    }

    #[test]
    fn test_refuses_index_without_config() {
        let provider = seeded_provider();
        let mut params = crate::test_support::fast_params();
        params.time_cost = 2;
        initializer()
            .with_kdf_params(params.clone())
            .initialize_provider(&provider, b"pw")
            .unwrap();
        provider.delete(CONFIG_FILENAME).unwrap();

        assert!(matches!(
            initializer().initialize_provider(&provider, b"pw"),
            Err(Error::Vault(_))
        ));
        assert!(!provider.exists(CONFIG_FILENAME).unwrap());
        assert_eq!(initializer().state_of(&provider).unwrap(), InitState::Initializing);

        // Restoring the original config makes the vault usable again.
        VaultConfig::new(params, 1024).store(&provider).unwrap();
        assert!(Vault::open_with_provider(Arc::new(provider), b"pw").is_ok());
    }

    #[test]
    fn test_existing_config_wins() {
        let provider = seeded_provider();
        let mut params = crate::test_support::fast_params();
        params.time_cost = 2;
        VaultConfig::new(params.clone(), 1024).store(&provider).unwrap();

        initializer().initialize_provider(&provider, b"pw").unwrap();

        assert_eq!(VaultConfig::load(&provider).unwrap().kdf_params, params);
    }

    #[test]
    fn test_base_path_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            initializer().initialize(&file, b"pw"),
            Err(Error::InvalidBasePath(_))
        ));
        assert!(matches!(
            initializer().state(&file),
            Err(Error::InvalidBasePath(_))
        ));
    }
}
