//! Transactional persistence of the index tree.
//!
//! Each mutation runs against a copy of the tree. The copy is serialized,
//! sealed and written to `index.enc`; only when the write succeeds does it
//! replace the in-memory tree. A failed write therefore leaves disk and
//! memory on the previous state.

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::INDEX_FILENAME;
use crate::tree::IndexTree;
use keepsafe_common::{Error, Result};
use keepsafe_crypto::SessionCipher;
use keepsafe_storage::StorageProvider;

/// The in-memory index, authoritative between writes.
#[derive(Debug, Clone)]
pub struct Index {
    tree: IndexTree,
}

impl Index {
    /// Write an empty index.
    pub fn create(provider: &dyn StorageProvider, session: &SessionCipher) -> Result<Self> {
        let tree = IndexTree::new();
        Self::write(provider, session, &tree)?;
        Ok(Self { tree })
    }

    /// Read and decrypt the index.
    ///
    /// # Errors
    /// - `Vault` if the index object does not exist
    /// - `InvalidPassword` if the session's password is wrong
    /// - `AuthenticationFailure` if the object is corrupt
    /// - `Serialization` if the decrypted document is invalid
    pub fn load(provider: &dyn StorageProvider, session: &SessionCipher) -> Result<Self> {
        let sealed = match provider.download(INDEX_FILENAME) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return Err(Error::Vault("Vault is not initialized".to_string()))
            }
            Err(e) => return Err(e),
        };
        let sealed = std::str::from_utf8(&sealed).map_err(|_| {
            Error::AuthenticationFailure(format!("{} is not an envelope", INDEX_FILENAME))
        })?;

        let plaintext = Zeroizing::new(session.open(sealed)?);
        let json = std::str::from_utf8(&plaintext)
            .map_err(|e| Error::Serialization(format!("Index is not UTF-8: {}", e)))?;
        let tree = IndexTree::from_json(json)?;

        debug!(files = tree.files().len(), "Index loaded");
        Ok(Self { tree })
    }

    /// Wrap an already persisted tree.
    pub(crate) fn from_persisted(tree: IndexTree) -> Self {
        Self { tree }
    }

    /// The current tree.
    pub fn tree(&self) -> &IndexTree {
        &self.tree
    }

    /// Apply `mutation` to a copy of the tree, persist the copy, then adopt
    /// it.
    ///
    /// # Postconditions
    /// - On success, `index.enc` and the in-memory tree both reflect the
    ///   mutation
    /// - On any error, neither has changed
    pub fn update<T>(
        &mut self,
        provider: &dyn StorageProvider,
        session: &SessionCipher,
        mutation: impl FnOnce(&mut IndexTree) -> Result<T>,
    ) -> Result<T> {
        let mut next = self.tree.clone();
        let outcome = mutation(&mut next)?;
        Self::write(provider, session, &next)?;
        self.tree = next;
        Ok(outcome)
    }

    /// Serialize, seal and atomically write `tree`.
    pub fn write(
        provider: &dyn StorageProvider,
        session: &SessionCipher,
        tree: &IndexTree,
    ) -> Result<()> {
        let json = Zeroizing::new(tree.to_json()?);
        let sealed = session.seal(json.as_bytes())?;
        provider.upload(INDEX_FILENAME, sealed.as_bytes())?;
        debug!(size = json.len(), "Index written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fast_params, shared_material};
    use crate::tree::StorageRef;
    use keepsafe_common::VaultPath;
    use keepsafe_crypto::EnvelopeCipher;
    use keepsafe_storage::MemoryProvider;

    fn session(password: &[u8]) -> SessionCipher {
        EnvelopeCipher::new(shared_material().clone(), fast_params())
            .session(password)
            .unwrap()
    }

    #[test]
    fn test_create_then_load() {
        let provider = MemoryProvider::new();
        let session = session(b"pw");

        Index::create(&provider, &session).unwrap();
        let loaded = Index::load(&provider, &session).unwrap();

        assert_eq!(loaded.tree(), &IndexTree::new());
    }

    #[test]
    fn test_update_persists() {
        let provider = MemoryProvider::new();
        let session = session(b"pw");
        let mut index = Index::create(&provider, &session).unwrap();

        index
            .update(&provider, &session, |tree| {
                tree.create_directory(&VaultPath::parse("a/b").unwrap())
            })
            .unwrap();

        let reloaded = Index::load(&provider, &session).unwrap();
        assert!(reloaded
            .tree()
            .directory_exists(&VaultPath::parse("a/b").unwrap()));
    }

    #[test]
    fn test_failed_write_changes_nothing() {
        let provider = MemoryProvider::new();
        let session = session(b"pw");
        let mut index = Index::create(&provider, &session).unwrap();
        let before = index.tree().clone();

        provider.fail_writes(true);
        let result = index.update(&provider, &session, |tree| {
            tree.add_file(&VaultPath::parse("f").unwrap(), StorageRef::generate(), 1)
        });
        provider.fail_writes(false);

        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(index.tree(), &before);
        assert_eq!(Index::load(&provider, &session).unwrap().tree(), &before);
    }

    #[test]
    fn test_failed_mutation_skips_write() {
        let provider = MemoryProvider::new();
        let session = session(b"pw");
        let mut index = Index::create(&provider, &session).unwrap();
        let stored = provider.download(INDEX_FILENAME).unwrap();

        let result = index.update(&provider, &session, |tree| {
            tree.remove_directory(&VaultPath::root())
        });

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(provider.download(INDEX_FILENAME).unwrap(), stored);
    }

    #[test]
    fn test_wrong_password_and_missing_index() {
        let provider = MemoryProvider::new();
        assert!(matches!(
            Index::load(&provider, &session(b"pw")),
            Err(Error::Vault(_))
        ));

        Index::create(&provider, &session(b"pw")).unwrap();
        assert!(matches!(
            Index::load(&provider, &session(b"other")),
            Err(Error::InvalidPassword)
        ));
    }
}
