//! Vault engine for keepsafe.
//!
//! This module provides:
//! - Vault bootstrap ([`VaultInitializer`])
//! - The encrypted index tree and its transactional persistence
//! - Encrypted file and directory operations ([`Vault`])
//! - Two-phase key rotation
//!
//! # Architecture
//! The vault sits between a front end and a storage provider. Payloads pass
//! through the envelope cipher before they reach storage; every index
//! mutation is re-encrypted and written in full before it returns.

pub mod config;
pub mod index;
pub mod initializer;
pub mod keystore;
pub mod rotation;
pub mod tree;
pub mod vault;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{VaultConfig, VaultVersion};
pub use index::Index;
pub use initializer::{InitState, VaultInitializer};
pub use rotation::RotationPlan;
pub use tree::{Directory, FileEntry, IndexTree, Node, NodeRef, StorageRef};
pub use vault::{DirEntry, EntryKind, FileContent, ReadMode, Vault};
