//! Encrypted file and directory operations.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{VaultConfig, INDEX_FILENAME};
use crate::index::Index;
use crate::keystore;
use crate::tree::{Directory, FileEntry, IndexTree, Node, StorageRef};
use keepsafe_common::{Error, Result, VaultPath};
use keepsafe_crypto::{EnvelopeCipher, SessionCipher};
use keepsafe_storage::{LocalProvider, StorageProvider};

/// How [`Vault::read_file`] should present a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// The decrypted bytes.
    Raw,
    /// UTF-8 text, falling back to base64 for binary payloads.
    Text,
}

/// A decrypted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Raw(Vec<u8>),
    Text(String),
    /// Payload was not valid UTF-8; this is its base64 encoding.
    Base64(String),
}

impl FileContent {
    /// Consume into bytes: raw content, text as UTF-8, or the base64 text.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Raw(bytes) => bytes,
            FileContent::Text(text) | FileContent::Base64(text) => text.into_bytes(),
        }
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Plaintext size for files.
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// An open vault.
///
/// Holds the session key for the password it was opened with. One instance
/// owns its base directory; nothing here is safe against a second writer.
pub struct Vault {
    pub(crate) provider: Arc<dyn StorageProvider>,
    pub(crate) session: SessionCipher,
    pub(crate) index: Index,
    pub(crate) config: VaultConfig,
}

impl Vault {
    /// Open the vault in `base_path`.
    ///
    /// # Errors
    /// - `InvalidBasePath` if the path is missing or not a directory
    /// - `Vault` if the directory holds no initialized vault
    /// - `InvalidPassword` if the password does not open the index
    pub fn open(base_path: impl AsRef<Path>, password: &[u8]) -> Result<Self> {
        let base_path = base_path.as_ref();
        if !base_path.is_dir() {
            return Err(Error::InvalidBasePath(format!(
                "{} is not a directory",
                base_path.display()
            )));
        }

        let provider = LocalProvider::new(base_path)?;
        Self::open_with_provider(Arc::new(provider), password)
    }

    /// Open a vault stored in `provider`.
    pub fn open_with_provider(provider: Arc<dyn StorageProvider>, password: &[u8]) -> Result<Self> {
        let config = VaultConfig::load(provider.as_ref())?;
        if !provider.exists(INDEX_FILENAME)? {
            return Err(Error::Vault("Vault is not initialized".to_string()));
        }

        let material = keystore::load_material(provider.as_ref())?;
        let session = EnvelopeCipher::new(material, config.kdf_params.clone()).session(password)?;
        let index = Index::load(provider.as_ref(), &session)?;

        info!(provider = provider.name(), "Vault opened");
        Ok(Self {
            provider,
            session,
            index,
            config,
        })
    }

    /// The vault configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The current index tree.
    pub fn tree(&self) -> &IndexTree {
        self.index.tree()
    }

    /// Store `data` at `path`, creating parent directories and replacing any
    /// existing file.
    ///
    /// # Postconditions
    /// - The payload is in a new object and the index points at it
    /// - A replaced payload's object is deleted
    ///
    /// # Errors
    /// - `NotAFile` if `path` is a directory
    /// - `NotADirectory` if a parent segment is a file
    pub fn add_file(&mut self, data: &[u8], path: &VaultPath) -> Result<()> {
        debug!(path = %path, size = data.len(), "Adding file");

        // Reject conflicts before writing an object that would be orphaned.
        let mut probe = self.index.tree().clone();
        probe.add_file(path, StorageRef::generate(), 0)?;

        let storage_ref = StorageRef::generate();
        let sealed = self.session.seal(data)?;
        self.provider
            .upload(&storage_ref.object_name(), sealed.as_bytes())?;

        let size = data.len() as u64;
        let new_ref = storage_ref.clone();
        let replaced = match self.index.update(self.provider.as_ref(), &self.session, |tree| {
            tree.add_file(path, new_ref, size)
        }) {
            Ok(replaced) => replaced,
            Err(e) => {
                self.discard_object(&storage_ref);
                return Err(e);
            }
        };

        if let Some(old) = replaced {
            self.discard_object(&old.storage_ref);
        }

        info!(path = %path, size = data.len(), "File added");
        Ok(())
    }

    /// Read the file at `path`.
    ///
    /// # Errors
    /// - `FileNotFound` if there is no such file
    /// - `NotAFile` if `path` is a directory
    /// - `AuthenticationFailure` if the object is corrupt
    pub fn read_file(&self, path: &VaultPath, mode: ReadMode) -> Result<FileContent> {
        let data = self.read_bytes(path)?;

        Ok(match mode {
            ReadMode::Raw => FileContent::Raw(data),
            ReadMode::Text => match String::from_utf8(data) {
                Ok(text) => FileContent::Text(text),
                Err(e) => FileContent::Base64(STANDARD.encode(e.into_bytes())),
            },
        })
    }

    /// Read the decrypted bytes of the file at `path`.
    pub fn read_bytes(&self, path: &VaultPath) -> Result<Vec<u8>> {
        debug!(path = %path, "Reading file");

        let entry = self.index.tree().file(path)?;
        let data = self.open_object(&entry.storage_ref)?;

        debug!(path = %path, size = data.len(), "File read");
        Ok(data)
    }

    /// Delete the file at `path`.
    ///
    /// # Errors
    /// - `FileNotFound` if there is no such file; storage is not touched
    /// - `NotAFile` if `path` is a directory
    pub fn delete_file(&mut self, path: &VaultPath) -> Result<()> {
        debug!(path = %path, "Deleting file");

        let storage_ref = self.index.tree().file(path)?.storage_ref.clone();
        match self.provider.delete(&storage_ref.object_name()) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(path = %path, object = %storage_ref, "Object already missing");
            }
            Err(e) => return Err(e),
        }

        self.index.update(self.provider.as_ref(), &self.session, |tree| {
            tree.remove_file(path)
        })?;

        info!(path = %path, "File deleted");
        Ok(())
    }

    /// Snapshot of the whole namespace.
    pub fn list_files(&self) -> Directory {
        self.index.tree().snapshot()
    }

    /// Entries of the directory at `path`, in name order.
    pub fn list_directory(&self, path: &VaultPath) -> Result<Vec<DirEntry>> {
        let dir = self.index.tree().directory(path)?;

        Ok(dir
            .children
            .values()
            .map(|node| match node {
                Node::Directory(d) => DirEntry {
                    name: d.name.clone(),
                    kind: EntryKind::Directory,
                    size: None,
                    modified_at: None,
                },
                Node::File(FileEntry {
                    name,
                    size,
                    modified_at,
                    ..
                }) => DirEntry {
                    name: name.clone(),
                    kind: EntryKind::File,
                    size: Some(*size),
                    modified_at: Some(*modified_at),
                },
            })
            .collect())
    }

    /// Create a directory and any missing parents.
    pub fn create_directory(&mut self, path: &VaultPath) -> Result<()> {
        debug!(path = %path, "Creating directory");

        self.index.update(self.provider.as_ref(), &self.session, |tree| {
            tree.create_directory(path)
        })?;

        info!(path = %path, "Directory created");
        Ok(())
    }

    /// Move a directory with its contents.
    pub fn rename_directory(&mut self, old: &VaultPath, new: &VaultPath) -> Result<()> {
        debug!(from = %old, to = %new, "Renaming directory");

        self.index.update(self.provider.as_ref(), &self.session, |tree| {
            tree.rename_directory(old, new)
        })?;

        info!(from = %old, to = %new, "Directory renamed");
        Ok(())
    }

    /// Delete a directory, its subtree and the payload objects of every
    /// file in it. Returns the number of files removed.
    pub fn delete_directory(&mut self, path: &VaultPath) -> Result<usize> {
        debug!(path = %path, "Deleting directory");

        let removed = self.index.update(self.provider.as_ref(), &self.session, |tree| {
            tree.remove_directory(path)
        })?;

        let files = removed.files();
        for file in &files {
            self.discard_object(&file.storage_ref);
        }

        info!(path = %path, files = files.len(), "Directory deleted");
        Ok(files.len())
    }

    /// Move a file. Returns its new path.
    pub fn move_file(&mut self, src: &VaultPath, dest: &VaultPath) -> Result<VaultPath> {
        debug!(from = %src, to = %dest, "Moving file");

        let target = self.index.update(self.provider.as_ref(), &self.session, |tree| {
            tree.move_file(src, dest)
        })?;

        info!(from = %src, to = %target, "File moved");
        Ok(target)
    }

    /// Whether `path` names an existing directory.
    pub fn directory_exists(&self, path: &VaultPath) -> bool {
        self.index.tree().directory_exists(path)
    }

    /// The vault public key as PEM.
    pub fn export_public_key(&self) -> Result<String> {
        self.session.cipher().export_public_key()
    }

    /// Fingerprint of the vault public key.
    pub fn fingerprint(&self) -> Result<String> {
        self.session.cipher().fingerprint()
    }

    /// Delete payload objects no index entry refers to.
    ///
    /// Such objects are left behind when a crash interrupts a write between
    /// the object and the index. Returns the names deleted.
    pub fn prune_orphans(&mut self) -> Result<Vec<String>> {
        let referenced: HashSet<&StorageRef> = self
            .index
            .tree()
            .files()
            .into_iter()
            .map(|f| &f.storage_ref)
            .collect();

        let mut pruned = Vec::new();
        for object in self.provider.list()? {
            if object.name == INDEX_FILENAME {
                continue;
            }
            let Some(storage_ref) = StorageRef::from_object_name(&object.name) else {
                continue;
            };
            if referenced.contains(&storage_ref) {
                continue;
            }

            self.provider.delete(&object.name)?;
            pruned.push(object.name);
        }

        info!(count = pruned.len(), "Orphaned objects pruned");
        Ok(pruned)
    }

    pub(crate) fn open_object(&self, storage_ref: &StorageRef) -> Result<Vec<u8>> {
        let sealed = match self.provider.download(&storage_ref.object_name()) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.is_not_found() => {
                return Err(Error::Vault(format!(
                    "Object {} referenced by the index is missing",
                    storage_ref.object_name()
                )))
            }
            Err(e) => return Err(e),
        };
        let sealed = std::str::from_utf8(&sealed).map_err(|_| {
            Error::AuthenticationFailure(format!("{} is not an envelope", storage_ref))
        })?;
        self.session.open(sealed)
    }

    /// Best-effort delete; failures are logged and left for pruning.
    pub(crate) fn discard_object(&self, storage_ref: &StorageRef) {
        if let Err(e) = self.provider.delete(&storage_ref.object_name()) {
            if !e.is_not_found() {
                warn!(object = %storage_ref, error = %e, "Failed to delete object");
            }
        }
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
