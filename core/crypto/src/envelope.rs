//! Self-describing, password-verifiable ciphertext envelopes.
//!
//! An envelope carries everything needed to decrypt one payload except the
//! secrets: the nonce, the symmetric key wrapped under the vault keypair,
//! and the AEAD ciphertext. Binary layout, before base64:
//!
//! ```text
//! version:u8 | nonce_len:u16be | nonce | wrapped_len:u16be | wrapped_key | ct_len:u32be | ciphertext
//! ```
//!
//! Every field is length-prefixed, so the format does not depend on the
//! keypair's modulus size.
//!
//! Decryption is a two-factor check. The private key unwraps the symmetric
//! key, the AEAD tag is verified with it, and finally the key re-derived
//! from the password must equal the unwrapped key. If rotation or corruption
//! makes the two disagree, decryption fails closed.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::aead::{self, NONCE_SIZE};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::SymmetricKey;
use crate::material::KeyMaterial;
use keepsafe_common::{Error, Result};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Parsed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// AEAD nonce, unique per encryption.
    pub nonce: [u8; NONCE_SIZE],
    /// Symmetric key encrypted under the vault public key.
    pub wrapped_key: Vec<u8>,
    /// AEAD output (ciphertext || tag).
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize to the length-prefixed binary layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wrapped_len = u16::try_from(self.wrapped_key.len())
            .map_err(|_| Error::Crypto("Wrapped key too long".to_string()))?;
        let ct_len = u32::try_from(self.ciphertext.len())
            .map_err(|_| Error::InvalidInput("Payload too large for one envelope".to_string()))?;

        let mut out = Vec::with_capacity(self.ciphertext_offset() + self.ciphertext.len());
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&(NONCE_SIZE as u16).to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&wrapped_len.to_be_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&ct_len.to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Parse the binary layout.
    ///
    /// # Errors
    /// - `AuthenticationFailure` for any framing problem: unknown version,
    ///   bad nonce length, truncation or trailing bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let version = reader.u8()?;
        if version != ENVELOPE_VERSION {
            return Err(malformed(format!("unsupported version {}", version)));
        }

        let nonce_len = reader.u16()? as usize;
        if nonce_len != NONCE_SIZE {
            return Err(malformed(format!("nonce length {}", nonce_len)));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(reader.take(NONCE_SIZE)?);

        let wrapped_len = reader.u16()? as usize;
        let wrapped_key = reader.take(wrapped_len)?.to_vec();

        let ct_len = reader.u32()? as usize;
        let ciphertext = reader.take(ct_len)?.to_vec();

        if !reader.is_empty() {
            return Err(malformed("trailing bytes".to_string()));
        }

        Ok(Self {
            nonce,
            wrapped_key,
            ciphertext,
        })
    }

    /// Serialize and base64-encode.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    /// Base64-decode and parse. Surrounding whitespace is ignored.
    pub fn decode(text: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| malformed(format!("invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Byte offset of the ciphertext field in the binary layout.
    pub fn ciphertext_offset(&self) -> usize {
        1 + 2 + NONCE_SIZE + 2 + self.wrapped_key.len() + 4
    }
}

fn malformed(detail: String) -> Error {
    Error::AuthenticationFailure(format!("Malformed envelope: {}", detail))
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(malformed("truncated".to_string()));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encrypts and decrypts payloads against a password.
#[derive(Debug, Clone)]
pub struct EnvelopeCipher {
    material: KeyMaterial,
    params: KdfParams,
}

impl EnvelopeCipher {
    /// Create a cipher over loaded key material.
    pub fn new(material: KeyMaterial, params: KdfParams) -> Self {
        Self { material, params }
    }

    /// The key material in use.
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Derive the symmetric key for `password` with the vault salt.
    pub fn derive_key(&self, password: &[u8]) -> Result<SymmetricKey> {
        derive_key(password, self.material.salt(), &self.params)
    }

    /// Encrypt `data` under `password`, returning a base64 envelope.
    pub fn encrypt(&self, data: &[u8], password: &[u8]) -> Result<String> {
        let key = self.derive_key(password)?;
        self.seal_with(&key, data)
    }

    /// Decrypt a base64 envelope with `password`.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the envelope is malformed, was wrapped
    ///   under another keypair, or fails AEAD authentication
    /// - `InvalidPassword` if the password-derived key is not the key the
    ///   envelope was sealed with
    pub fn decrypt(&self, envelope: &str, password: &[u8]) -> Result<Vec<u8>> {
        let (key, data) = self.unseal(envelope)?;
        let derived = self.derive_key(password)?;
        if !derived.ct_matches(&key) {
            return Err(Error::InvalidPassword);
        }
        Ok(data)
    }

    /// Derive the key for `password` once and bind it to a copy of this
    /// cipher.
    pub fn session(&self, password: &[u8]) -> Result<SessionCipher> {
        let key = self.derive_key(password)?;
        Ok(SessionCipher {
            cipher: self.clone(),
            key,
        })
    }

    /// Replace seed, salt and keypair with fresh material of the same key
    /// size.
    ///
    /// Envelopes produced before the call can no longer be decrypted by this
    /// cipher. Callers holding stored envelopes must decrypt them first and
    /// re-encrypt afterwards; vaults do this through their two-phase
    /// rotation.
    pub fn rotate_keys(&mut self) -> Result<()> {
        self.material = KeyMaterial::generate(self.material.keypair().key_bits())?;
        Ok(())
    }

    /// The public key as SPKI PEM.
    pub fn export_public_key(&self) -> Result<String> {
        self.material.keypair().public_key_pem()
    }

    /// Fingerprint of the public key.
    pub fn fingerprint(&self) -> Result<String> {
        self.material.keypair().fingerprint()
    }

    fn seal_with(&self, key: &SymmetricKey, data: &[u8]) -> Result<String> {
        let nonce = aead::generate_nonce();
        let ciphertext = aead::encrypt_with_nonce(key, &nonce, data)?;
        let wrapped_key = self.material.keypair().wrap_key(key)?;

        Envelope {
            nonce,
            wrapped_key,
            ciphertext,
        }
        .encode()
    }

    fn unseal(&self, envelope: &str) -> Result<(SymmetricKey, Vec<u8>)> {
        let envelope = Envelope::decode(envelope)?;
        let key = self.material.keypair().unwrap_key(&envelope.wrapped_key)?;
        let data = aead::decrypt_with_nonce(&key, &envelope.nonce, &envelope.ciphertext)?;
        Ok((key, data))
    }
}

/// An [`EnvelopeCipher`] bound to one password-derived key.
///
/// Produces and accepts exactly the envelopes `encrypt`/`decrypt` do for
/// that password, without re-running the KDF per payload.
#[derive(Debug, Clone)]
pub struct SessionCipher {
    cipher: EnvelopeCipher,
    key: SymmetricKey,
}

impl SessionCipher {
    /// The underlying cipher.
    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    /// Encrypt `data`, returning a base64 envelope.
    pub fn seal(&self, data: &[u8]) -> Result<String> {
        self.cipher.seal_with(&self.key, data)
    }

    /// Decrypt a base64 envelope.
    ///
    /// Same failure modes as [`EnvelopeCipher::decrypt`].
    pub fn open(&self, envelope: &str) -> Result<Vec<u8>> {
        let (key, data) = self.cipher.unseal(envelope)?;
        if !self.key.ct_matches(&key) {
            return Err(Error::InvalidPassword);
        }
        Ok(data)
    }
}
