//! Sidecar persistence for key material.
//!
//! The seed, salt and private key live beside the encrypted index as three
//! plain objects. Loading never generates; [`ensure_material`] generates
//! only the sidecars that are missing and never overwrites one.

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::{KEYPAIR_FILENAME, MASTER_SEED_FILENAME, SALT_FILENAME};
use keepsafe_common::{Error, Result};
use keepsafe_crypto::{KeyMaterial, KeyPair, MasterSeed, Salt};
use keepsafe_storage::StorageProvider;

/// Every sidecar object name.
pub const SIDECARS: [&str; 3] = [MASTER_SEED_FILENAME, SALT_FILENAME, KEYPAIR_FILENAME];

/// Names of sidecars not present in storage.
pub fn missing_sidecars(provider: &dyn StorageProvider) -> Result<Vec<&'static str>> {
    let mut missing = Vec::new();
    for name in SIDECARS {
        if !provider.exists(name)? {
            missing.push(name);
        }
    }
    Ok(missing)
}

/// Load all three sidecars.
///
/// # Errors
/// - `Vault` if any sidecar is missing
/// - `Crypto` if a sidecar is malformed
pub fn load_material(provider: &dyn StorageProvider) -> Result<KeyMaterial> {
    let missing = missing_sidecars(provider)?;
    if !missing.is_empty() {
        return Err(Error::Vault(format!(
            "Key material incomplete, missing: {}",
            missing.join(", ")
        )));
    }

    Ok(KeyMaterial::from_parts(
        load_seed(provider)?,
        load_salt(provider)?,
        load_keypair(provider)?,
    ))
}

/// Load the sidecars that exist and generate the rest.
///
/// Newly generated sidecars are written before returning. Existing ones are
/// never replaced.
pub fn ensure_material(provider: &dyn StorageProvider, key_bits: usize) -> Result<KeyMaterial> {
    let seed = if provider.exists(MASTER_SEED_FILENAME)? {
        load_seed(provider)?
    } else {
        let seed = MasterSeed::generate();
        provider.upload(MASTER_SEED_FILENAME, seed.as_bytes())?;
        info!(object = MASTER_SEED_FILENAME, "Generated master seed");
        seed
    };

    let salt = if provider.exists(SALT_FILENAME)? {
        load_salt(provider)?
    } else {
        let salt = Salt::generate();
        provider.upload(SALT_FILENAME, salt.as_bytes())?;
        info!(object = SALT_FILENAME, "Generated salt");
        salt
    };

    let keypair = if provider.exists(KEYPAIR_FILENAME)? {
        load_keypair(provider)?
    } else {
        let keypair = KeyPair::generate(key_bits)?;
        provider.upload(KEYPAIR_FILENAME, keypair.to_pkcs8_pem()?.as_bytes())?;
        info!(object = KEYPAIR_FILENAME, key_bits, "Generated keypair");
        keypair
    };

    Ok(KeyMaterial::from_parts(seed, salt, keypair))
}

/// Overwrite all three sidecars with `material`.
///
/// The keypair goes first and the seed last. The writes are individually
/// atomic but not atomic as a group.
pub fn store_material(provider: &dyn StorageProvider, material: &KeyMaterial) -> Result<()> {
    provider.upload(
        KEYPAIR_FILENAME,
        material.keypair().to_pkcs8_pem()?.as_bytes(),
    )?;
    provider.upload(SALT_FILENAME, material.salt().as_bytes())?;
    provider.upload(MASTER_SEED_FILENAME, material.seed().as_bytes())?;
    debug!("Key material stored");
    Ok(())
}

fn load_seed(provider: &dyn StorageProvider) -> Result<MasterSeed> {
    let bytes = Zeroizing::new(provider.download(MASTER_SEED_FILENAME)?);
    MasterSeed::from_slice(&bytes)
}

fn load_salt(provider: &dyn StorageProvider) -> Result<Salt> {
    let bytes = provider.download(SALT_FILENAME)?;
    Salt::from_slice(&bytes)
}

fn load_keypair(provider: &dyn StorageProvider) -> Result<KeyPair> {
    let bytes = Zeroizing::new(provider.download(KEYPAIR_FILENAME)?);
    let pem = std::str::from_utf8(&bytes)
        .map_err(|_| Error::Crypto(format!("{} is not valid PEM", KEYPAIR_FILENAME)))?;
    KeyPair::from_pkcs8_pem(pem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::shared_material;
    use keepsafe_crypto::MIN_KEY_BITS;
    use keepsafe_storage::MemoryProvider;

    #[test]
    fn test_store_then_load() {
        let provider = MemoryProvider::new();
        let material = shared_material();

        store_material(&provider, material).unwrap();
        let loaded = load_material(&provider).unwrap();

        assert_eq!(loaded.seed().as_bytes(), material.seed().as_bytes());
        assert_eq!(loaded.salt(), material.salt());
        assert_eq!(
            loaded.keypair().fingerprint().unwrap(),
            material.keypair().fingerprint().unwrap()
        );
    }

    #[test]
    fn test_load_reports_missing_sidecars() {
        let provider = MemoryProvider::new();
        store_material(&provider, shared_material()).unwrap();
        provider.delete(SALT_FILENAME).unwrap();

        assert_eq!(missing_sidecars(&provider).unwrap(), vec![SALT_FILENAME]);
        assert!(matches!(load_material(&provider), Err(Error::Vault(_))));
    }

    #[test]
    fn test_ensure_generates_only_missing() {
        let provider = MemoryProvider::new();
        let material = shared_material();
        store_material(&provider, material).unwrap();
        provider.delete(MASTER_SEED_FILENAME).unwrap();

        let ensured = ensure_material(&provider, MIN_KEY_BITS).unwrap();

        assert!(missing_sidecars(&provider).unwrap().is_empty());
        assert_eq!(ensured.salt(), material.salt());
        assert_eq!(
            ensured.keypair().fingerprint().unwrap(),
            material.keypair().fingerprint().unwrap()
        );
        assert_ne!(ensured.seed().as_bytes(), material.seed().as_bytes());
    }

    #[test]
    fn test_malformed_sidecars() {
        let provider = MemoryProvider::new();
        store_material(&provider, shared_material()).unwrap();

        provider.upload(SALT_FILENAME, &[1, 2, 3]).unwrap();
        assert!(load_material(&provider).is_err());

        store_material(&provider, shared_material()).unwrap();
        provider.upload(KEYPAIR_FILENAME, b"garbage").unwrap();
        assert!(matches!(load_material(&provider), Err(Error::Crypto(_))));
    }
}
