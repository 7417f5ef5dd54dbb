//! In-memory storage provider for testing.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::provider::{validate_object_name, Metadata, StorageProvider};
use keepsafe_common::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory storage provider.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    storage: Arc<RwLock<HashMap<String, Entry>>>,
    fail_writes: Arc<AtomicBool>,
    fail_uploads: Arc<RwLock<HashSet<String>>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `upload` and `delete` fail with a storage
    /// error until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make uploads of `name` fail while other objects stay writable.
    pub fn fail_uploads_of(&self, name: &str) {
        if let Ok(mut names) = self.fail_uploads.write() {
            names.insert(name.to_string());
        }
    }

    /// Undo every [`MemoryProvider::fail_uploads_of`].
    pub fn clear_upload_failures(&self) {
        if let Ok(mut names) = self.fail_uploads.write() {
            names.clear();
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("Injected write failure".to_string()));
        }
        Ok(())
    }

    fn check_uploadable(&self, name: &str) -> Result<()> {
        self.check_writable()?;
        let blocked = self
            .fail_uploads
            .read()
            .map_err(|_| Error::Storage("Memory storage lock poisoned".to_string()))?
            .contains(name);
        if blocked {
            return Err(Error::Storage(format!("Injected upload failure: {}", name)));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.storage
            .read()
            .map_err(|_| Error::Storage("Memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.storage
            .write()
            .map_err(|_| Error::Storage("Memory storage lock poisoned".to_string()))
    }
}

impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn upload(&self, name: &str, data: &[u8]) -> Result<Metadata> {
        validate_object_name(name)?;
        self.check_uploadable(name)?;

        let entry = Entry {
            data: data.to_vec(),
            modified: Utc::now(),
        };
        let metadata = Metadata {
            name: name.to_string(),
            size: data.len() as u64,
            modified: entry.modified,
        };
        self.write()?.insert(name.to_string(), entry);

        Ok(metadata)
    }

    fn download(&self, name: &str) -> Result<Vec<u8>> {
        validate_object_name(name)?;
        self.read()?
            .get(name)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", name)))
    }

    fn exists(&self, name: &str) -> Result<bool> {
        validate_object_name(name)?;
        Ok(self.read()?.contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<()> {
        validate_object_name(name)?;
        self.check_writable()?;

        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", name)))
    }

    fn list(&self) -> Result<Vec<Metadata>> {
        let mut results: Vec<Metadata> = self
            .read()?
            .iter()
            .map(|(name, entry)| Metadata {
                name: name.clone(),
                size: entry.data.len() as u64,
                modified: entry.modified,
            })
            .collect();

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_upload_download() {
        let provider = MemoryProvider::new();

        provider.upload("test.enc", b"Hello, World!").unwrap();
        assert_eq!(provider.download("test.enc").unwrap(), b"Hello, World!");
        assert!(provider.exists("test.enc").unwrap());
    }

    #[test]
    fn test_memory_delete() {
        let provider = MemoryProvider::new();
        provider.upload("test.enc", &[1, 2, 3]).unwrap();

        provider.delete("test.enc").unwrap();
        assert!(!provider.exists("test.enc").unwrap());
        assert!(matches!(provider.delete("test.enc"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_memory_list_sorted() {
        let provider = MemoryProvider::new();
        provider.upload("b.enc", &[1, 2]).unwrap();
        provider.upload("a.enc", &[1]).unwrap();

        let listed = provider.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "a.enc");
        assert_eq!(listed[1].size, 2);
    }

    #[test]
    fn test_injected_write_failure() {
        let provider = MemoryProvider::new();
        provider.upload("index.enc", b"v1").unwrap();

        provider.fail_writes(true);
        assert!(matches!(
            provider.upload("index.enc", b"v2"),
            Err(Error::Storage(_))
        ));
        assert!(provider.delete("index.enc").is_err());
        assert_eq!(provider.download("index.enc").unwrap(), b"v1");

        provider.fail_writes(false);
        provider.upload("index.enc", b"v2").unwrap();
        assert_eq!(provider.download("index.enc").unwrap(), b"v2");
    }

    #[test]
    fn test_injected_upload_failure_for_one_object() {
        let provider = MemoryProvider::new();
        provider.fail_uploads_of("index.enc");

        assert!(provider.upload("index.enc", b"v1").is_err());
        provider.upload("other.enc", b"ok").unwrap();
        provider.delete("other.enc").unwrap();

        provider.clear_upload_failures();
        provider.upload("index.enc", b"v1").unwrap();
    }

    #[test]
    fn test_clones_share_storage() {
        let provider = MemoryProvider::new();
        let clone = provider.clone();

        clone.upload("shared.enc", b"x").unwrap();
        assert!(provider.exists("shared.enc").unwrap());
    }
}
