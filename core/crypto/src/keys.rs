//! Key types with secure memory handling.
//!
//! Secret key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::{rngs::OsRng, RngCore};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use keepsafe_common::{Error, Result};

/// Length of symmetric keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the master seed in bytes.
pub const SEED_LENGTH: usize = 32;

/// Length of freshly generated salts in bytes.
pub const SALT_LENGTH: usize = 32;

/// Shortest salt accepted when loading existing key material.
pub const MIN_SALT_LENGTH: usize = 16;

/// Symmetric key derived from the vault password.
///
/// This key encrypts every payload and is itself carried, wrapped under
/// the vault keypair, inside each envelope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_LENGTH],
}

impl SymmetricKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a key from a slice, which must be exactly KEY_LENGTH bytes.
    ///
    /// # Errors
    /// - Returns error if the slice has the wrong length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Compare two keys in constant time.
    pub fn ct_matches(&self, other: &SymmetricKey) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Random seed kept alongside the vault keys.
///
/// The seed is not used as a cipher key. It is generated with the rest of
/// the key material and replaced on every rotation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSeed {
    seed: [u8; SEED_LENGTH],
}

impl MasterSeed {
    /// Generate a random seed.
    pub fn generate() -> Self {
        let mut seed = [0u8; SEED_LENGTH];
        OsRng.fill_bytes(&mut seed);
        Self { seed }
    }

    /// Create from a slice, which must be exactly SEED_LENGTH bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; SEED_LENGTH] = bytes.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid seed length: expected {}, got {}",
                SEED_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { seed })
    }

    /// Get the seed bytes.
    pub fn as_bytes(&self) -> &[u8; SEED_LENGTH] {
        &self.seed
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSeed([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    ///
    /// # Errors
    /// - Returns error unless the salt is 16 to 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if !(MIN_SALT_LENGTH..=SALT_LENGTH).contains(&bytes.len()) {
            return Err(Error::Crypto(format!(
                "Invalid salt length: expected {} to {} bytes, got {}",
                MIN_SALT_LENGTH,
                SALT_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_from_slice() {
        assert!(SymmetricKey::from_slice(&[7u8; KEY_LENGTH]).is_ok());
        assert!(SymmetricKey::from_slice(&[7u8; 16]).is_err());
    }

    #[test]
    fn test_constant_time_match() {
        let a = SymmetricKey::from_bytes([1u8; KEY_LENGTH]);
        let b = SymmetricKey::from_bytes([1u8; KEY_LENGTH]);
        let mut other = [1u8; KEY_LENGTH];
        other[KEY_LENGTH - 1] = 2;
        let c = SymmetricKey::from_bytes(other);

        assert!(a.ct_matches(&b));
        assert!(!a.ct_matches(&c));
    }

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        assert_eq!(salt1.as_bytes().len(), SALT_LENGTH);
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_salt_length_bounds() {
        assert!(Salt::from_slice(&[0u8; 15]).is_err());
        assert!(Salt::from_slice(&[0u8; 16]).is_ok());
        assert!(Salt::from_slice(&[0u8; 32]).is_ok());
        assert!(Salt::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn test_seed_generate() {
        let seed1 = MasterSeed::generate();
        let seed2 = MasterSeed::generate();
        assert_ne!(seed1.as_bytes(), seed2.as_bytes());
        assert!(MasterSeed::from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "SymmetricKey([REDACTED])");
    }
}
