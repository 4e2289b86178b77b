/// Storage backends for the match data store
///
/// Every collection and key-value entry is one JSON document addressed by a
/// string key. Backends only move strings; (de)serialization happens in
/// `Collection` and `KeyValueStore`.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::StoreError;

pub trait StorageBackend: Send + Sync {
    /// Document stored under `key`, `None` when absent
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the document under `key`
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Process-local backend, used by tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.documents.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.documents
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.documents.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.documents.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// One `<key>.json` file per document under a data directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a data directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Storage {
            key: dir.display().to_string(),
            source,
        })?;
        debug!(dir = %dir.display(), "Opened file storage");
        Ok(Self { dir })
    }

    /// Platform data directory, e.g. `~/.local/share/CricketLive/data`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("CricketLive").join("data"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn storage_error(key: &str, source: io::Error) -> StoreError {
        StoreError::Storage {
            key: key.to_string(),
            source,
        }
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::storage_error(key, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        // Write then rename so a crash never leaves a half-written document
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp, value).map_err(|e| Self::storage_error(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| Self::storage_error(key, e))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::storage_error(key, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| Self::storage_error("<dir>", e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::storage_error("<dir>", e))?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Memory backend whose writes to one key can be made to fail
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    failing_key: RwLock<Option<String>>,
}

#[cfg(test)]
impl FlakyBackend {
    pub(crate) fn fail_writes_to(&self, key: &str) {
        *self.failing_key.write() = Some(key.to_string());
    }

    pub(crate) fn recover(&self) {
        *self.failing_key.write() = None;
    }
}

#[cfg(test)]
impl StorageBackend for FlakyBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.failing_key.read().as_deref() == Some(key) {
            return Err(StoreError::Storage {
                key: key.to_string(),
                source: io::Error::other("disk full"),
            });
        }
        self.inner.write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys()
    }
}
