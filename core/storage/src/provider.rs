//! Storage provider trait definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keepsafe_common::{Error, Result};

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Object name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// Storage provider trait for different backends.
///
/// Objects live in one flat namespace. All operations are synchronous and
/// block the calling thread.
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Write an object, replacing any previous content.
    ///
    /// # Postconditions
    /// - On success the object holds exactly `data`
    /// - On failure the previous content (or absence) is unchanged
    ///
    /// # Errors
    /// - `InvalidInput` if `name` is not a valid object name
    /// - I/O errors
    fn upload(&self, name: &str, data: &[u8]) -> Result<Metadata>;

    /// Read an object in full.
    ///
    /// # Errors
    /// - `NotFound` if the object does not exist
    fn download(&self, name: &str) -> Result<Vec<u8>>;

    /// Check if an object exists.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Delete an object.
    ///
    /// # Errors
    /// - `NotFound` if the object does not exist
    fn delete(&self, name: &str) -> Result<()>;

    /// List all objects.
    fn list(&self) -> Result<Vec<Metadata>>;
}

/// Reject names that could escape the flat namespace.
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(Error::InvalidInput(format!(
            "Invalid object name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_object_name() {
        assert!(validate_object_name("index.enc").is_ok());
        assert!(validate_object_name("0f3a.enc").is_ok());

        for bad in ["", ".", "..", "a/b", "..\\up", "nul\0"] {
            assert!(
                matches!(validate_object_name(bad), Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
