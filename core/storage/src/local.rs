//! Local filesystem storage provider.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::provider::{validate_object_name, Metadata, StorageProvider};
use keepsafe_common::{Error, Result};

/// Local filesystem storage provider.
///
/// Stores each object as a file directly under the root directory. Writes go
/// to a hidden temporary file in the same directory which is then renamed
/// over the target, so a crash never leaves a half-written object.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - `InvalidBasePath` if the root exists but is not a directory
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if root.exists() && !root.is_dir() {
            return Err(Error::InvalidBasePath(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        validate_object_name(name)?;
        Ok(self.root.join(name))
    }

    fn create_metadata(name: &str, fs_meta: &fs::Metadata) -> Metadata {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        Metadata {
            name: name.to_string(),
            size: fs_meta.len(),
            modified,
        }
    }

    fn write_temp(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(data)?;
        file.sync_all()
    }

    /// Report a renamed object. The rename already replaced the target, so a
    /// failed directory sync is logged rather than returned.
    fn finish_upload(
        name: &str,
        target: &Path,
        dir_synced: std::io::Result<()>,
    ) -> Result<Metadata> {
        if let Err(e) = dir_synced {
            warn!(object = name, error = %e, "Failed to sync vault directory");
        }
        let fs_meta = fs::metadata(target)?;
        Ok(Self::create_metadata(name, &fs_meta))
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> std::io::Result<()> {
        fs::File::open(&self.root)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn upload(&self, name: &str, data: &[u8]) -> Result<Metadata> {
        let target = self.object_path(name)?;
        let temp = self
            .root
            .join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));

        if let Err(e) = Self::write_temp(&temp, data).and_then(|_| fs::rename(&temp, &target)) {
            if temp.exists() {
                if let Err(cleanup) = fs::remove_file(&temp) {
                    warn!(path = %temp.display(), error = %cleanup, "Failed to remove temp file");
                }
            }
            return Err(e.into());
        }

        debug!(object = name, size = data.len(), "Object written");
        Self::finish_upload(name, &target, self.sync_dir())
    }

    fn download(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(name)?;

        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object not found: {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.object_path(name)?.is_file())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.object_path(name)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(object = name, "Object deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object not found: {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Metadata>> {
        let mut results = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            // Temp files and other hidden entries are not objects.
            if name.starts_with('.') {
                continue;
            }

            let fs_meta = entry.metadata()?;
            if fs_meta.is_file() {
                results.push(Self::create_metadata(&name, &fs_meta));
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}
