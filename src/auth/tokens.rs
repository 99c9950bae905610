//! Token storage and management
//!
//! A [`TokenStore`] persists one obfuscated bearer token together with the
//! instant it was saved. Records older than [`RETENTION_WINDOW_SECS`] are
//! treated as expired no matter what the token itself claims, and any read
//! that finds an expired or corrupted record deletes it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::obfuscator::Obfuscator;
use crate::storage::{FileBackend, PrefsFile, RecordBackend, StoreError};

/// Field holding the obfuscated token.
pub const TOKEN_KEY: &str = "encrypted_token";
/// Field holding the save instant (decimal Unix seconds).
pub const TIMESTAMP_KEY: &str = "token_timestamp";
/// Maximum age of a persisted record: 7 days.
pub const RETENTION_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Which durable medium a token store writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Key-value preference file.
    #[default]
    Prefs,
    /// Separate files under the app data directory.
    File,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Prefs => f.write_str("prefs"),
            StoreKind::File => f.write_str("file"),
        }
    }
}

/// Token store trait for different storage backends
pub trait TokenStore: Send + Sync {
    fn kind(&self) -> StoreKind;
    /// Persist `token`. Empty tokens are rejected as a no-op.
    fn save_token(&self, token: &str) -> Result<(), StoreError>;
    /// The stored token, or `None` if absent, expired or corrupted.
    fn get_token(&self) -> Option<String>;
    /// Delete the record. Idempotent; failures are logged.
    fn clear_token(&self);
    /// True if a fresh, decodable record exists.
    fn has_token(&self) -> bool;
}

/// Shared store semantics over any [`RecordBackend`].
pub struct ObfuscatedStore<B> {
    backend: B,
    obfuscator: Obfuscator,
    kind: StoreKind,
    clock: fn() -> i64,
}

/// Variant backed by the preference file.
pub type PrefsTokenStore = ObfuscatedStore<Arc<PrefsFile>>;
/// Variant backed by one file per field.
pub type FileTokenStore = ObfuscatedStore<FileBackend>;

impl<B: RecordBackend> ObfuscatedStore<B> {
    pub fn new(backend: B, kind: StoreKind) -> Self {
        Self {
            backend,
            obfuscator: Obfuscator::default(),
            kind,
            clock: unix_now,
        }
    }

    /// Replace the wall clock, for exercising the retention window.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Expired if the timestamp is missing, unreadable, or older than the
    /// retention window.
    fn is_expired(&self) -> bool {
        let saved_at = match self.backend.read(TIMESTAMP_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(ts) => ts,
                Err(_) => {
                    tracing::warn!("Unparsable token timestamp {:?}", raw);
                    return true;
                }
            },
            Ok(None) => return true,
            Err(e) => {
                tracing::warn!("Failed to read token timestamp: {}", e);
                return true;
            }
        };

        let elapsed = match (self.clock)().checked_sub(saved_at) {
            Some(elapsed) if elapsed >= 0 => elapsed,
            _ => {
                tracing::warn!(
                    "Token timestamp {} is out of range, treating as expired",
                    saved_at
                );
                return true;
            }
        };
        if elapsed > RETENTION_WINDOW_SECS {
            tracing::info!(
                "Stored token is {}s old (limit {}s), treating as expired",
                elapsed,
                RETENTION_WINDOW_SECS
            );
            return true;
        }
        false
    }

    fn read_encoded(&self) -> Option<String> {
        match self.backend.read(TOKEN_KEY) {
            Ok(Some(raw)) if !raw.is_empty() => Some(raw),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read stored token: {}", e);
                None
            }
        }
    }
}

impl<B: RecordBackend> TokenStore for ObfuscatedStore<B> {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn save_token(&self, token: &str) -> Result<(), StoreError> {
        if token.is_empty() {
            tracing::warn!("Refusing to save an empty token");
            return Ok(());
        }

        let encoded = self.obfuscator.encrypt(token);
        self.backend.write(TOKEN_KEY, &encoded)?;
        if let Err(e) = self
            .backend
            .write(TIMESTAMP_KEY, &(self.clock)().to_string())
        {
            // A new token must never be paired with an older save time.
            if let Err(cleanup) = self.backend.remove(TOKEN_KEY) {
                tracing::warn!(
                    "Failed to roll back token in {} store: {}",
                    self.kind,
                    cleanup
                );
            }
            return Err(e);
        }
        tracing::debug!("Token saved to {} store", self.kind);
        Ok(())
    }

    fn get_token(&self) -> Option<String> {
        if self.is_expired() {
            self.clear_token();
            return None;
        }

        let encoded = self.read_encoded()?;
        let token = self.obfuscator.decrypt(&encoded);
        if token.is_empty() {
            tracing::warn!("Stored token is corrupted, clearing it");
            self.clear_token();
            return None;
        }
        Some(token)
    }

    fn clear_token(&self) {
        for key in [TOKEN_KEY, TIMESTAMP_KEY] {
            if let Err(e) = self.backend.remove(key) {
                tracing::warn!("Failed to delete {} from {} store: {}", key, self.kind, e);
            }
        }
    }

    fn has_token(&self) -> bool {
        if self.is_expired() {
            self.clear_token();
            return false;
        }
        self.read_encoded()
            .is_some_and(|encoded| self.obfuscator.is_valid_encoded(&encoded))
    }
}

/// Where each store variant keeps its record.
#[derive(Debug, Clone)]
pub struct StoreLocations {
    pub prefs: Arc<PrefsFile>,
    pub token_dir: PathBuf,
}

impl StoreLocations {
    pub fn new(prefs: Arc<PrefsFile>, token_dir: impl Into<PathBuf>) -> Self {
        Self {
            prefs,
            token_dir: token_dir.into(),
        }
    }

    /// Construct a store of the requested kind.
    pub fn open(&self, kind: StoreKind) -> Box<dyn TokenStore> {
        match kind {
            StoreKind::Prefs => Box::new(PrefsTokenStore::new(Arc::clone(&self.prefs), kind)),
            StoreKind::File => Box::new(FileTokenStore::new(
                FileBackend::new(&self.token_dir),
                kind,
            )),
        }
    }
}

/// Result of moving a token between stores.
pub struct Migrated {
    pub store: Box<dyn TokenStore>,
    /// `Ok(true)` if a token was carried over, `Ok(false)` if there was none.
    pub carried: Result<bool, StoreError>,
}

/// Move the current token from `old` into a fresh store of `kind`.
///
/// Reads the token, clears the old store, opens the new one and saves the
/// token there if one was present.
pub fn migrate_store(
    old: &dyn TokenStore,
    kind: StoreKind,
    locations: &StoreLocations,
) -> Migrated {
    let token = old.get_token();
    old.clear_token();

    let store = locations.open(kind);
    let carried = match token {
        Some(token) => store.save_token(&token).map(|()| true),
        None => Ok(false),
    };
    if let Err(e) = &carried {
        tracing::warn!("Failed to carry token into {} store: {}", kind, e);
    }
    Migrated { store, carried }
}
