//! Durable record backends for the token store
//!
//! A backend is a tiny string-keyed area that can read, write and delete
//! named fields. The token store layers obfuscation and expiry on top.

pub mod files;
pub mod prefs;

use std::sync::Arc;

pub use files::FileBackend;
pub use prefs::PrefsFile;

/// Failure talking to the durable medium.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse preference file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Field-level access to a durable key-value area.
pub trait RecordBackend: Send + Sync {
    /// Read a field. `Ok(None)` when the field does not exist.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Create or overwrite a field.
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Delete a field. Deleting a missing field is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: RecordBackend + ?Sized> RecordBackend for Arc<T> {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Restrict a file holding credentials to the owner.
pub(crate) fn restrict_permissions(path: &std::path::Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms).map_err(|e| StoreError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
