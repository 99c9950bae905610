//! Key-value preference area backed by a single TOML file
//!
//! The file is a flat table of string values. Every operation is a
//! load-mutate-save cycle so several handles on the same file stay coherent.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{restrict_permissions, RecordBackend, StoreError};

/// Flat string preferences persisted as `prefs.toml`.
#[derive(Debug)]
pub struct PrefsFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PrefsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        toml::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Load for a write. An unparsable file is replaced rather than kept, so a
    /// torn write cannot wedge every later update. The flag is true when the
    /// file must be rewritten even if nothing changes.
    fn load_for_update(&self) -> Result<(BTreeMap<String, String>, bool), StoreError> {
        match self.load() {
            Ok(map) => Ok((map, false)),
            Err(StoreError::Parse { path, source }) => {
                tracing::warn!("Discarding unreadable preference file {}: {}", path, source);
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        let content = toml::to_string_pretty(map)?;
        fs::write(&self.path, content).map_err(|e| StoreError::io(&self.path, e))?;
        restrict_permissions(&self.path)
    }

    /// Read one value.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.remove(key))
    }

    /// Set one value, keeping every other key intact.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let (mut map, _) = self.load_for_update()?;
        map.insert(key.to_string(), value.to_string());
        self.store(&map)
    }

    /// Delete one value. The file is not rewritten if the key was absent.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let (mut map, discarded) = self.load_for_update()?;
        if map.remove(key).is_some() || discarded {
            self.store(&map)?;
        }
        Ok(())
    }
}

impl RecordBackend for PrefsFile {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.delete(key)
    }
}
