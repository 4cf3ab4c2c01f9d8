//! Cache settings
//!
//! Stored as JSON; every field has a default so partial files are accepted.

use crate::cache::CacheConfig;
use crate::error::ImageCacheError;
use crate::store::StorageMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Directory the per-set image folders (or containers) live in
    pub image_root: PathBuf,
    pub storage_mode: StorageMode,
    /// Memory budget for decoded images
    pub max_memory_bytes: Option<u64>,
    pub max_entries: Option<usize>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            image_root: default_image_root(),
            storage_mode: StorageMode::default(),
            max_memory_bytes: Some(DEFAULT_MAX_MEMORY_BYTES),
            max_entries: None,
        }
    }
}

impl CacheSettings {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ImageCacheError> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: CacheSettings = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            image_root = %settings.image_root.display(),
            storage_mode = %settings.storage_mode,
            "Loaded cache settings"
        );
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ImageCacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!(path = %path.display(), "Saved cache settings");
        Ok(())
    }

    /// Limits for the in-memory image cache
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries,
            max_size_bytes: self.max_memory_bytes,
        }
    }

    /// Where settings are kept when no path is given
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "card-image-cache")
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .unwrap_or_else(|| std::env::temp_dir().join("card-image-cache").join("settings.json"))
    }
}

fn default_image_root() -> PathBuf {
    ProjectDirs::from("", "", "card-image-cache")
        .map(|dirs| dirs.data_dir().join("pics"))
        .unwrap_or_else(|| std::env::temp_dir().join("card-image-cache").join("pics"))
}
