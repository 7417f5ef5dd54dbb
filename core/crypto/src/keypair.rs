//! RSA keypair used to wrap per-envelope symmetric keys.
//!
//! Keys are wrapped with RSA-OAEP over SHA-256. The private half is stored
//! as unencrypted PKCS#8 PEM beside the vault; confidentiality of the
//! payloads rests on the password-derived key, not on this file.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

use crate::keys::SymmetricKey;
use keepsafe_common::{Error, Result};

/// Modulus size used for new vaults.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus accepted. OAEP-SHA256 needs at least 98 bytes of
/// modulus to carry a 32-byte key.
pub const MIN_KEY_BITS: usize = 1024;

/// Asymmetric keypair held by the vault.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair.
    ///
    /// # Errors
    /// - `InvalidInput` if `bits` is below MIN_KEY_BITS
    /// - `Crypto` if generation fails
    pub fn generate(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(Error::InvalidInput(format!(
                "Key size must be at least {} bits, got {}",
                MIN_KEY_BITS, bits
            )));
        }

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Crypto(format!("Keypair generation failed: {}", e)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Parse a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::Crypto(format!("Invalid private key: {}", e)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Encode the private key as PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Private key encoding failed: {}", e)))
    }

    /// Encode the public key as SubjectPublicKeyInfo PEM.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Public key encoding failed: {}", e)))
    }

    /// Encode the public key as SubjectPublicKeyInfo DER.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| Error::Crypto(format!("Public key encoding failed: {}", e)))
    }

    /// BLAKE2b-256 digest of the public key DER, lowercase hex.
    pub fn fingerprint(&self) -> Result<String> {
        let der = self.public_key_der()?;
        let digest = Blake2b::<U32>::digest(&der);
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Modulus size in bits.
    pub fn key_bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Encrypt a symmetric key under the public key.
    pub fn wrap_key(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        self.public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|e| Error::Crypto(format!("Key wrapping failed: {}", e)))
    }

    /// Recover a symmetric key wrapped by [`KeyPair::wrap_key`].
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the wrapped key was produced under a
    ///   different keypair or has been altered
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SymmetricKey> {
        let raw = Zeroizing::new(
            self.private
                .decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| Error::AuthenticationFailure("Key unwrap failed".to_string()))?,
        );

        SymmetricKey::from_slice(&raw).map_err(|_| {
            Error::AuthenticationFailure("Unwrapped key has the wrong length".to_string())
        })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({} bits, [REDACTED])", self.key_bits())
    }
}
