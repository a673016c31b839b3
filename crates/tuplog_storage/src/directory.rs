//! Named byte stores.
//!
//! A [`Directory`] is a flat namespace of [`StorageBackend`]s. The engine
//! keeps snapshots and log segments in one directory and tells them apart
//! by file name only.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A flat directory of named byte stores.
pub trait Directory: Send + Sync {
    /// Lists the names of all stores, in no particular order.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Returns true if a store with this name exists.
    fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Opens an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no such store.
    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>>;

    /// Creates a new, empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the name is taken.
    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>>;

    /// Atomically renames a store, replacing any store named `to`.
    fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Removes a store.
    fn remove(&self, name: &str) -> StorageResult<()>;

    /// Makes creations, renames and removals durable.
    fn sync(&self) -> StorageResult<()>;

    /// Returns a human-readable location for `name`, used in log lines.
    fn location(&self, name: &str) -> String {
        name.to_string()
    }
}

/// A directory on the local file system.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    root: PathBuf,
}

impl FileDirectory {
    /// Opens `root`, creating it first if `create_if_missing` is set.
    pub fn open(root: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !root.exists() {
            if create_if_missing {
                fs::create_dir_all(root)?;
            } else {
                return Err(StorageError::NotFound(root.display().to_string()));
            }
        }
        if !root.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a directory: {}", root.display()),
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Directory for FileDirectory {
    fn list(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.root.join(name).is_file())
    }

    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FileBackend::open_existing(&self.root.join(name))?))
    }

    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FileBackend::create_new(&self.root.join(name))?))
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        fs::rename(self.root.join(from), self.root.join(to))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        fs::remove_file(self.root.join(name)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(e),
        })
    }

    #[cfg(unix)]
    fn sync(&self) -> StorageResult<()> {
        fs::File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync(&self) -> StorageResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }

    fn location(&self, name: &str) -> String {
        self.root.join(name).display().to_string()
    }
}

/// An in-memory directory.
///
/// Clones share the same namespace, so a test can keep one handle to
/// plant or tamper with files while an engine owns another.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    files: Arc<RwLock<BTreeMap<String, InMemoryBackend>>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared handle to the named store, if present.
    #[must_use]
    pub fn backend(&self, name: &str) -> Option<InMemoryBackend> {
        self.files.read().get(name).cloned()
    }

    /// Inserts or overwrites a store with the given contents.
    pub fn put(&self, name: &str, data: Vec<u8>) {
        self.files
            .write()
            .insert(name.to_string(), InMemoryBackend::with_data(data));
    }
}

impl Directory for InMemoryDirectory {
    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.files.read().contains_key(name))
    }

    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        self.backend(name)
            .map(|b| Box::new(b) as Box<dyn StorageBackend>)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        let mut files = self.files.write();
        if files.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        let backend = InMemoryBackend::new();
        files.insert(name.to_string(), backend.clone());
        Ok(Box::new(backend))
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let mut files = self.files.write();
        let backend = files
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        files.insert(to.to_string(), backend);
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn sync(&self) -> StorageResult<()> {
        Ok(())
    }
}
