//! Shared fixtures for vault tests.

use std::sync::{Arc, OnceLock};

use crate::initializer::VaultInitializer;
use crate::keystore;
use crate::vault::Vault;
use keepsafe_crypto::{KdfParams, KeyMaterial, MIN_KEY_BITS};
use keepsafe_storage::{MemoryProvider, StorageProvider};

/// Cheap KDF parameters; never use outside tests.
pub fn fast_params() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

/// One small keypair shared by every test that does not need fresh keys.
pub fn shared_material() -> &'static KeyMaterial {
    static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
    MATERIAL.get_or_init(|| KeyMaterial::generate(MIN_KEY_BITS).unwrap())
}

/// Initializer configured for tests.
pub fn initializer() -> VaultInitializer {
    VaultInitializer::new()
        .with_kdf_params(fast_params())
        .with_key_bits(MIN_KEY_BITS)
}

/// An initialized in-memory vault using the shared keypair.
pub fn memory_vault(password: &[u8]) -> (MemoryProvider, Vault) {
    let provider = MemoryProvider::new();
    keystore::store_material(&provider, shared_material()).unwrap();
    initializer()
        .initialize_provider(&provider, password)
        .unwrap();

    let shared: Arc<dyn StorageProvider> = Arc::new(provider.clone());
    let vault = Vault::open_with_provider(shared, password).unwrap();
    (provider, vault)
}
