//! One-file-per-field records under an app-private directory

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{restrict_permissions, RecordBackend, StoreError};

const FIELD_EXTENSION: &str = "dat";

/// Stores each field as `<dir>/<key>.dat`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn field_path(&self, key: &str) -> PathBuf {
        self.dir.join(key).with_extension(FIELD_EXTENSION)
    }
}

impl RecordBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.field_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.field_path(key);
        fs::write(&path, value).map_err(|e| StoreError::io(&path, e))?;
        restrict_permissions(&path)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.field_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
