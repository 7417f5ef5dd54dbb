//! Two-phase key rotation and password change.
//!
//! Phase one ([`Vault::begin_rotation`]) decrypts the index and every
//! payload under the current keys. Phase two ([`Vault::commit_rotation`])
//! generates fresh key material, re-encrypts everything under it and the new
//! password, and retires the old objects.
//!
//! Commit writes in this order:
//!
//! 1. every payload into a new object
//! 2. the key sidecars
//! 3. `index.enc`
//! 4. deletion of the old payload objects
//! 5. `vault.config` with a new `modified_at`
//!
//! A failure in step 1 removes the new objects. A failure in step 2 or 3
//! restores the old sidecars and removes the new objects. A crash between
//! steps 2 and 3 leaves sidecars that do not match the index; there is no
//! cross-file atomicity. Leftover objects from any interruption are removed
//! by [`Vault::prune_orphans`].

use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::index::Index;
use crate::keystore;
use crate::tree::{IndexTree, StorageRef};
use crate::vault::Vault;
use keepsafe_common::{Error, Result, SensitiveBytes};
use keepsafe_crypto::{EnvelopeCipher, KeyMaterial};

/// Everything phase one decrypted.
pub struct RotationPlan {
    tree: IndexTree,
    payloads: HashMap<StorageRef, SensitiveBytes>,
}

impl RotationPlan {
    /// Number of payloads that will be re-encrypted.
    pub fn file_count(&self) -> usize {
        self.payloads.len()
    }

    /// Total plaintext bytes that will be re-encrypted.
    pub fn total_size(&self) -> u64 {
        self.payloads.values().map(|p| p.len() as u64).sum()
    }
}

impl fmt::Debug for RotationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationPlan")
            .field("files", &self.payloads.len())
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Decrypt the whole vault in preparation for rotation.
    ///
    /// Nothing is written. The plan holds plaintext in zeroizing buffers;
    /// drop it to abandon the rotation.
    pub fn begin_rotation(&self) -> Result<RotationPlan> {
        let tree = self.index.tree().clone();
        let mut payloads = HashMap::new();

        for file in tree.files() {
            let data = self.open_object(&file.storage_ref)?;
            payloads.insert(file.storage_ref.clone(), SensitiveBytes::new(data));
        }

        info!(files = payloads.len(), "Rotation prepared");
        Ok(RotationPlan { tree, payloads })
    }

    /// Re-encrypt the vault under fresh key material and `new_password`.
    ///
    /// `new_password` may equal the current password, in which case only the
    /// keys change.
    ///
    /// # Errors
    /// - `Vault` if the index changed after `plan` was taken
    /// - Storage errors; see the module docs for what each failure leaves
    pub fn commit_rotation(&mut self, plan: RotationPlan, new_password: &[u8]) -> Result<()> {
        if &plan.tree != self.index.tree() {
            return Err(Error::Vault(
                "Index changed since rotation began".to_string(),
            ));
        }

        let material = KeyMaterial::generate(self.config.key_bits)?;
        let session =
            EnvelopeCipher::new(material, self.config.kdf_params.clone()).session(new_password)?;

        let mut tree = plan.tree;
        let mut old_refs = Vec::new();
        let mut new_refs = Vec::new();

        for file in tree.files_mut() {
            let payload = plan.payloads.get(&file.storage_ref).ok_or_else(|| {
                Error::Vault(format!("No payload prepared for {}", file.storage_ref))
            });
            let written = payload.and_then(|payload| {
                let new_ref = StorageRef::generate();
                let sealed = session.seal(payload.as_bytes())?;
                self.provider
                    .upload(&new_ref.object_name(), sealed.as_bytes())?;
                Ok(new_ref)
            });

            match written {
                Ok(new_ref) => {
                    old_refs.push(std::mem::replace(&mut file.storage_ref, new_ref.clone()));
                    new_refs.push(new_ref);
                }
                Err(e) => {
                    self.discard_all(&new_refs);
                    return Err(e);
                }
            }
        }

        let old_material = self.session.cipher().material().clone();
        let stored = keystore::store_material(self.provider.as_ref(), session.cipher().material())
            .and_then(|_| Index::write(self.provider.as_ref(), &session, &tree));
        if let Err(e) = stored {
            if let Err(restore) = keystore::store_material(self.provider.as_ref(), &old_material) {
                warn!(error = %restore, "Failed to restore previous key material");
            }
            self.discard_all(&new_refs);
            return Err(e);
        }

        self.session = session;
        self.index = Index::from_persisted(tree);
        self.discard_all(&old_refs);

        self.config.touch();
        if let Err(e) = self.config.store(self.provider.as_ref()) {
            warn!(error = %e, "Failed to record rotation time in config");
        }

        info!(files = new_refs.len(), "Keys rotated");
        Ok(())
    }

    fn discard_all(&self, refs: &[StorageRef]) {
        for storage_ref in refs {
            self.discard_object(storage_ref);
        }
    }
}
