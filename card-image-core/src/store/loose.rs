//! Loose-file storage: every path is a regular file on disk.

use super::VirtualFileStore;
use crate::error::ImageCacheError;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default)]
pub struct LooseFileStore;

impl LooseFileStore {
    pub fn new() -> Self {
        LooseFileStore
    }
}

impl VirtualFileStore for LooseFileStore {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ImageCacheError> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path, "File does not exist");
                Ok(None)
            }
            Err(e) => Err(ImageCacheError::Io(e)),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), ImageCacheError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!(dir = %parent.display(), "Created image directory");
            }
        }

        fs::write(path, data)?;
        debug!(path = %path, size_bytes = data.len(), "Wrote file");
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), ImageCacheError> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path, "Removed file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ImageCacheError::Io(e)),
        }
    }

    fn store_name(&self) -> &'static str {
        "LooseFileStore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("M10").join("Shock.full.jpg");
        let path = path.to_str().unwrap();
        let store = LooseFileStore::new();

        assert!(!store.exists(path));
        store.write(path, b"jpeg bytes").unwrap();

        assert!(store.exists(path));
        assert_eq!(store.read(path).unwrap(), Some(b"jpeg bytes".to_vec()));
    }

    #[test]
    fn test_missing_file_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing.jpg");
        let store = LooseFileStore::new();

        assert_eq!(store.read(path.to_str().unwrap()).unwrap(), None);
        // removing a missing file is fine too
        store.remove(path.to_str().unwrap()).unwrap();
    }

    #[test]
    fn test_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.thumb.jpg");
        let path = path.to_str().unwrap();
        let store = LooseFileStore::new();

        store.write(path, b"old").unwrap();
        store.write(path, b"new").unwrap();
        assert_eq!(store.read(path).unwrap(), Some(b"new".to_vec()));

        store.remove(path).unwrap();
        assert!(!store.exists(path));
    }
}
