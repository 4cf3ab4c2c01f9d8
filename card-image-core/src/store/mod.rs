//! Virtual file store
//!
//! Card images live either as loose files in a directory tree or inside zip containers
//! (one container per set). Both are reached through the [`VirtualFileStore`] trait with
//! plain string paths, so the rest of the crate never needs to know which one is active.

mod archive;
mod loose;
mod memory;

pub use archive::ArchiveFileStore;
pub use loose::LooseFileStore;
pub use memory::MemoryStore;

use crate::error::ImageCacheError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How card images are laid out on disk, as chosen in the preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One image file per card under per-set directories
    #[default]
    Loose,
    /// Per-set zip containers, addressed as `<root>/<SET>.zip/<entry>`
    Archive,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Loose => write!(f, "loose files"),
            StorageMode::Archive => write!(f, "zip archives"),
        }
    }
}

/// Uniform byte access over the backing image store.
///
/// Every call opens and closes its own stream, so nothing stays open once the
/// call returns, whether it succeeded or not.
pub trait VirtualFileStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Read the whole file; `Ok(None)` when it does not exist
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ImageCacheError>;

    /// Create or overwrite the file
    fn write(&self, path: &str, data: &[u8]) -> Result<(), ImageCacheError>;

    /// Remove the file; removing a missing file is not an error
    fn remove(&self, path: &str) -> Result<(), ImageCacheError>;

    /// Human-readable name for logging
    fn store_name(&self) -> &'static str;
}

/// Open the store matching the configured storage mode
pub fn open_store(mode: StorageMode) -> Arc<dyn VirtualFileStore> {
    match mode {
        StorageMode::Loose => Arc::new(LooseFileStore::new()),
        StorageMode::Archive => Arc::new(ArchiveFileStore::new()),
    }
}
