//! Long-lived vault secrets.

use crate::keypair::KeyPair;
use crate::keys::{MasterSeed, Salt};
use keepsafe_common::Result;

/// The seed, salt and keypair a vault's envelopes are bound to.
///
/// Replacing any part makes every envelope produced under the old material
/// unreadable, so material is only ever swapped as a whole.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    seed: MasterSeed,
    salt: Salt,
    keypair: KeyPair,
}

impl KeyMaterial {
    /// Generate fresh material with an RSA modulus of `key_bits`.
    pub fn generate(key_bits: usize) -> Result<Self> {
        Ok(Self {
            seed: MasterSeed::generate(),
            salt: Salt::generate(),
            keypair: KeyPair::generate(key_bits)?,
        })
    }

    /// Assemble material loaded from storage.
    pub fn from_parts(seed: MasterSeed, salt: Salt, keypair: KeyPair) -> Self {
        Self {
            seed,
            salt,
            keypair,
        }
    }

    /// The master seed.
    pub fn seed(&self) -> &MasterSeed {
        &self.seed
    }

    /// The KDF salt.
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// The wrapping keypair.
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}
