//! Cryptographic primitives for keepsafe.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using ChaCha20-Poly1305
//! - RSA-OAEP key wrapping
//! - The self-describing envelope format every vault object is stored in
//!
//! # Security Guarantees
//! - All symmetric key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison of derived and unwrapped keys

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod material;

pub use envelope::{Envelope, EnvelopeCipher, SessionCipher};
pub use kdf::{derive_key, KdfParams};
pub use keypair::{KeyPair, DEFAULT_KEY_BITS, MIN_KEY_BITS};
pub use keys::{MasterSeed, Salt, SymmetricKey, KEY_LENGTH};
pub use material::KeyMaterial;
