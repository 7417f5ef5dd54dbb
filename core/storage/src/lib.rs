//! Storage provider abstraction for Keepsafe.
//!
//! A vault persists a flat set of named objects: the key material sidecars,
//! the encrypted index and one envelope per stored file. Providers hide
//! where those bytes live.
//!
//! # Design Principles
//! - Provider isolation: no provider-specific logic in vault or crypto modules
//! - Flat namespace: object names never contain path separators
//! - Atomic writes: a reader observes either the old or the new object

pub mod local;
pub mod memory;
pub mod provider;

pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::{validate_object_name, Metadata, StorageProvider};
