//! Authenticated encryption using ChaCha20-Poly1305.
//!
//! ChaCha20-Poly1305 provides both confidentiality and authenticity with a
//! 96-bit nonce. Nonces come from the OS CSPRNG on every call; together with
//! a 256-bit key the collision probability is negligible at vault scale.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::keys::SymmetricKey;
use keepsafe_common::{Error, Result};

/// Nonce size for ChaCha20-Poly1305 (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Generate a fresh random nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt plaintext with a specific nonce.
///
/// # Preconditions
/// - `nonce` must never repeat for the same key
///
/// # Postconditions
/// - Returns ciphertext || tag, TAG_SIZE bytes longer than the plaintext
///
/// # Security
/// - Caller is responsible for nonce uniqueness; use [`generate_nonce`]
pub fn encrypt_with_nonce(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
}

/// Decrypt ciphertext with a specific nonce.
///
/// # Errors
/// - `AuthenticationFailure` if the ciphertext is too short or the tag does
///   not verify (tampered data or wrong key)
pub fn decrypt_with_nonce(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailure(
            "Ciphertext too short".to_string(),
        ));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::AuthenticationFailure("Ciphertext authentication failed".to_string()))
}
