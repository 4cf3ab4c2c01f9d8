//! Zip-backed storage
//!
//! A path such as `/images/M10.zip/M10/Shock.full.jpg` names the entry
//! `M10/Shock.full.jpg` inside the container `/images/M10.zip`. Paths without a
//! `.zip` segment fall through to plain files, so card backs and other loose assets
//! keep working in archive mode.

use super::{LooseFileStore, VirtualFileStore};
use crate::error::ImageCacheError;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTAINER_EXTENSION: &str = ".zip";

#[derive(Debug, Default)]
pub struct ArchiveFileStore {
    plain: LooseFileStore,
    /// Container rewrites are not atomic with respect to each other
    write_lock: Mutex<()>,
}

/// A path split into its zip container and the entry name inside it
#[derive(Debug, PartialEq, Eq)]
struct ArchivePath {
    container: PathBuf,
    entry: String,
}

impl ArchiveFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_archive(container: &Path) -> Result<Option<ZipArchive<BufReader<File>>>, ImageCacheError> {
        if !container.is_file() {
            return Ok(None);
        }
        let file = File::open(container)?;
        Ok(Some(ZipArchive::new(BufReader::new(file))?))
    }

    /// Rewrite `container`, dropping `entry` and, when `data` is given, adding it back
    /// with the new contents. Other entries are copied without recompression.
    fn rewrite_container(&self, target: &ArchivePath, data: Option<&[u8]>) -> Result<(), ImageCacheError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = target.container.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_name = target.container.clone().into_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let result = Self::write_container(&target.container, &temp_path, &target.entry, data)
            .and_then(|()| fs::rename(&temp_path, &target.container).map_err(ImageCacheError::Io));

        if result.is_err() && temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                warn!(file = %temp_path.display(), error = %e, "Failed to remove partial archive");
            }
        }
        result
    }

    fn write_container(
        container: &Path,
        temp_path: &Path,
        entry: &str,
        data: Option<&[u8]>,
    ) -> Result<(), ImageCacheError> {
        let mut writer = ZipWriter::new(File::create(temp_path)?);

        // an unreadable container is replaced instead of failing every later write
        let existing = match Self::open_archive(container) {
            Ok(archive) => archive,
            Err(e) => {
                warn!(
                    container = %container.display(),
                    error = %e,
                    "Archive is unreadable, replacing it with a new one"
                );
                None
            }
        };

        if let Some(mut archive) = existing {
            for index in 0..archive.len() {
                let existing = archive.by_index_raw(index)?;
                if existing.name() == entry {
                    continue;
                }
                writer.raw_copy_file(existing)?;
            }
        }

        if let Some(data) = data {
            // card images are already compressed
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            writer.start_file(entry, options)?;
            writer.write_all(data)?;
        }

        writer.finish()?;
        Ok(())
    }
}

impl VirtualFileStore for ArchiveFileStore {
    fn exists(&self, path: &str) -> bool {
        let Some(target) = split_archive_path(path) else {
            return self.plain.exists(path);
        };

        match Self::open_archive(&target.container) {
            Ok(Some(mut archive)) => archive.by_name(&target.entry).is_ok(),
            Ok(None) => false,
            Err(e) => {
                debug!(container = %target.container.display(), error = %e, "Unreadable archive");
                false
            }
        }
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ImageCacheError> {
        let Some(target) = split_archive_path(path) else {
            return self.plain.read(path);
        };

        let Some(mut archive) = Self::open_archive(&target.container)? else {
            debug!(container = %target.container.display(), "Archive does not exist");
            return Ok(None);
        };

        let mut entry = match archive.by_name(&target.entry) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                debug!(path = %path, "Archive entry does not exist");
                return Ok(None);
            }
            Err(e) => return Err(ImageCacheError::Archive(e)),
        };

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), ImageCacheError> {
        let Some(target) = split_archive_path(path) else {
            return self.plain.write(path, data);
        };

        self.rewrite_container(&target, Some(data))?;
        debug!(
            container = %target.container.display(),
            entry = %target.entry,
            size_bytes = data.len(),
            "Wrote archive entry"
        );
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), ImageCacheError> {
        let Some(target) = split_archive_path(path) else {
            return self.plain.remove(path);
        };

        if !target.container.is_file() {
            return Ok(());
        }
        self.rewrite_container(&target, None)?;
        debug!(container = %target.container.display(), entry = %target.entry, "Removed archive entry");
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "ArchiveFileStore"
    }
}

/// Split at the first path component ending in `.zip`. Entry names always use `/`.
fn split_archive_path(path: &str) -> Option<ArchivePath> {
    let components: Vec<Component<'_>> = Path::new(path).components().collect();
    let split = components.iter().position(|component| {
        matches!(component, Component::Normal(name)
            if name.to_string_lossy().to_lowercase().ends_with(CONTAINER_EXTENSION))
    })?;

    let entry: Vec<String> = components[split + 1..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if entry.is_empty() {
        return None;
    }

    Some(ArchivePath {
        container: components[..=split].iter().collect(),
        entry: entry.join("/"),
    })
}
