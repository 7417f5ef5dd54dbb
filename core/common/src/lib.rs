//! Common utilities and types shared across keepsafe crates.
//!
//! This crate provides the error type every other crate reports through,
//! the logical vault path type and a zeroizing byte buffer.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{SensitiveBytes, VaultPath};
