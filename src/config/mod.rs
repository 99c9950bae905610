//! Configuration and storage locations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::auth::{StoreKind, StoreLocations};
use crate::autoload::AutoLoadSettings;
use crate::storage::PrefsFile;

const DEFAULT_API_BASE: &str = "http://localhost:8080/api/";

/// Timing for the per-domain auto-loaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoLoadConfig {
    pub initial_delay_ms: u64,
    pub poll_interval_secs: u64,
}

impl Default for AutoLoadConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            poll_interval_secs: 5,
        }
    }
}

impl AutoLoadConfig {
    pub fn settings(&self) -> AutoLoadSettings {
        AutoLoadSettings {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            // A zero interval would make tokio::time::interval panic.
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
        }
    }
}

/// One data domain to auto-load after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Endpoint relative to `api_base_url`.
    pub endpoint: String,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend root; endpoints are resolved against it.
    pub api_base_url: String,
    /// Where the session token is persisted.
    pub token_store: StoreKind,
    pub autoload: AutoLoadConfig,
    pub collections: Vec<CollectionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            token_store: StoreKind::default(),
            autoload: AutoLoadConfig::default(),
            collections: vec![
                CollectionConfig {
                    name: "inventory".to_string(),
                    endpoint: "inventory".to_string(),
                },
                CollectionConfig {
                    name: "shop".to_string(),
                    endpoint: "shop/items".to_string(),
                },
            ],
        }
    }
}

/// Directories the application reads and writes.
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppDirs {
    /// Platform directories, e.g. `~/.config/playsession` on Linux.
    pub fn platform() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "playsession", "playsession")
            .context("Could not determine config directory")?;
        Ok(Self {
            config_dir: proj_dirs.config_dir().to_path_buf(),
            data_dir: proj_dirs.data_dir().to_path_buf(),
        })
    }

    /// Keep everything under one directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn prefs_path(&self) -> PathBuf {
        self.config_dir.join("prefs.toml")
    }

    pub fn token_dir(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    pub fn store_locations(&self) -> StoreLocations {
        StoreLocations::new(Arc::new(PrefsFile::new(self.prefs_path())), self.token_dir())
    }
}

impl Config {
    /// Load configuration from disk
    pub fn load(dirs: &AppDirs) -> Result<Self> {
        let path = dirs.config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self, dirs: &AppDirs) -> Result<()> {
        fs::create_dir_all(&dirs.config_dir).context("Failed to create config directory")?;

        let path = dirs.config_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }
}
