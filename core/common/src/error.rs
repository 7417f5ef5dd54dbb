//! Common error types for keepsafe.

use thiserror::Error;

/// Top-level error type for keepsafe operations.
///
/// Each variant is specific enough for a caller to tell a wrong password
/// apart from a missing entry or from corrupted data.
#[derive(Debug, Error)]
pub enum Error {
    /// Base path is missing or is not a directory.
    #[error("Invalid base path: {0}")]
    InvalidBasePath(String),

    /// No file entry at the given path.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A directory along the path does not exist.
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A path segment that must be a directory is a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A path that must name a file names a directory.
    #[error("Not a file: {0}")]
    NotAFile(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The password-derived key disagrees with the key in the envelope.
    #[error("Invalid password")]
    InvalidPassword,

    /// Ciphertext failed authentication (tampered or corrupt data).
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Vault operation failed.
    #[error("Vault error: {0}")]
    Vault(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error means "nothing at that path", whatever its kind.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::FileNotFound(_) | Error::DirectoryNotFound(_) | Error::NotFound(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
