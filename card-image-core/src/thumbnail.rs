//! Thumbnail artifacts
//!
//! Thumbnails are derived files stored next to the original image (or in a sibling
//! `.thumb.zip` container in archive mode). They are created on first request and
//! rebuilt whenever the stored file turns out to be undecodable.

use crate::key::CardKey;
use crate::pipeline;
use crate::store::{StorageMode, VirtualFileStore};
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pixel size thumbnails are generated at
pub const THUMBNAIL_SIZE_FULL: (u32, u32) = (102, 146);

const ORIGINAL_EXTENSION: &str = ".jpg";
const THUMBNAIL_EXTENSION: &str = ".thumb.jpg";
const CONTAINER_EXTENSION: &str = ".zip";
const THUMBNAIL_CONTAINER_EXTENSION: &str = ".thumb.zip";

/// Derive where the thumbnail of `original` is stored.
///
/// Only JPEG originals get thumbnails. `None` when no distinct thumbnail path exists,
/// which keeps a thumbnail from ever overwriting its original.
pub fn thumbnail_path(original: &str, mode: StorageMode) -> Option<String> {
    if !original.ends_with(ORIGINAL_EXTENSION) {
        return None;
    }

    let derived = match mode {
        StorageMode::Archive => original.replacen(CONTAINER_EXTENSION, THUMBNAIL_CONTAINER_EXTENSION, 1),
        StorageMode::Loose => {
            let stem = &original[..original.len() - ORIGINAL_EXTENSION.len()];
            format!("{}{}", stem, THUMBNAIL_EXTENSION)
        }
    };

    (derived != original).then_some(derived)
}

pub struct ThumbnailManager {
    store: Arc<dyn VirtualFileStore>,
    mode: StorageMode,
    size: (u32, u32),
}

impl ThumbnailManager {
    pub fn new(store: Arc<dyn VirtualFileStore>, mode: StorageMode) -> Self {
        Self::with_size(store, mode, THUMBNAIL_SIZE_FULL)
    }

    pub fn with_size(store: Arc<dyn VirtualFileStore>, mode: StorageMode, size: (u32, u32)) -> Self {
        Self { store, mode, size }
    }

    /// Return the thumbnail for the image at `original`, creating or repairing the stored
    /// artifact when needed. Originals that cannot have a thumbnail are returned full size.
    pub fn get_or_create(&self, original: &str, key: &CardKey) -> Option<DynamicImage> {
        let Some(thumb_path) = thumbnail_path(original, self.mode) else {
            debug!(key = %key, path = %original, "No thumbnail path, using the full image");
            return pipeline::load(self.store.as_ref(), original).map(pipeline::apply_vendor_crop);
        };

        if self.store.exists(&thumb_path) {
            debug!(key = %key, path = %thumb_path, "Loading thumbnail");
            if let Some(thumbnail) = pipeline::load(self.store.as_ref(), &thumb_path) {
                return Some(thumbnail);
            }
            warn!(
                key = %key,
                path = %thumb_path,
                "Failed loading thumbnail, file is probably broken, attempting to recreate it"
            );
        }

        self.regenerate(key, original, &thumb_path)
    }

    fn regenerate(&self, key: &CardKey, original: &str, thumb_path: &str) -> Option<DynamicImage> {
        let image = pipeline::load(self.store.as_ref(), original)?;
        let image = pipeline::apply_vendor_crop(image);

        debug!(key = %key, path = %thumb_path, "Creating thumbnail");
        let (width, height) = self.size;
        let thumbnail = pipeline::resize_exact(&image, width, height);
        self.persist(&thumbnail, thumb_path);
        Some(thumbnail)
    }

    /// Write the thumbnail to the store. Failures only cost a regeneration next time,
    /// so they are logged and the partial file is removed.
    fn persist(&self, thumbnail: &DynamicImage, thumb_path: &str) {
        let written = pipeline::encode_for_storage(thumbnail)
            .and_then(|bytes| self.store.write(thumb_path, &bytes));

        match written {
            Ok(()) => debug!(path = %thumb_path, store = self.store.store_name(), "Saved thumbnail"),
            Err(e) => {
                warn!(path = %thumb_path, error = %e, "Failed to save thumbnail");
                if let Err(e) = self.store.remove(thumb_path) {
                    debug!(path = %thumb_path, error = %e, "Failed to remove stale thumbnail");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_images::{coordinate_image, png_bytes};
    use crate::store::{ArchiveFileStore, MemoryStore};
    use image::GenericImageView;

    const ORIGINAL: &str = "/images/M10/Shock.full.jpg";
    const THUMB: &str = "/images/M10/Shock.full.thumb.jpg";

    fn shock_key() -> CardKey {
        CardKey::parse("Shock#M10#1#156##thumb#").unwrap()
    }

    fn manager(store: &MemoryStore) -> ThumbnailManager {
        ThumbnailManager::new(Arc::new(store.clone()), StorageMode::Loose)
    }

    #[test]
    fn test_thumbnail_paths() {
        assert_eq!(
            thumbnail_path(ORIGINAL, StorageMode::Loose).as_deref(),
            Some(THUMB)
        );
        assert_eq!(
            thumbnail_path("/images/M10.zip/M10/Shock.full.jpg", StorageMode::Archive).as_deref(),
            Some("/images/M10.thumb.zip/M10/Shock.full.jpg")
        );
        // no container to substitute, so no separate thumbnail
        assert_eq!(thumbnail_path("/images/default/cardback.jpg", StorageMode::Archive), None);
        assert_eq!(thumbnail_path("/images/M10/Shock.full.png", StorageMode::Loose), None);
    }

    #[test]
    fn test_creates_and_persists_missing_thumbnail() {
        let store = MemoryStore::new();
        store.preload(ORIGINAL, png_bytes(&coordinate_image(265, 370)));
        let manager = manager(&store);

        let thumbnail = manager.get_or_create(ORIGINAL, &shock_key()).unwrap();
        assert_eq!(thumbnail.dimensions(), THUMBNAIL_SIZE_FULL);
        assert!(store.exists(THUMB));

        // the next request is served from the stored thumbnail
        let again = manager.get_or_create(ORIGINAL, &shock_key()).unwrap();
        assert_eq!(again.dimensions(), THUMBNAIL_SIZE_FULL);
        assert_eq!(store.reads_of(ORIGINAL), 1);
        assert_eq!(store.reads_of(THUMB), 1);
        assert_eq!(store.write_call_count(), 1);
    }

    #[test]
    fn test_corrupt_thumbnail_is_regenerated() {
        let store = MemoryStore::new();
        store.preload(ORIGINAL, png_bytes(&coordinate_image(256, 360)));
        store.preload(THUMB, b"\xFF\xD8 truncated jpeg".to_vec());
        let manager = manager(&store);

        let thumbnail = manager.get_or_create(ORIGINAL, &shock_key()).unwrap();
        assert_eq!(thumbnail.dimensions(), THUMBNAIL_SIZE_FULL);
        assert_eq!(store.write_call_count(), 1);

        let repaired = store.get_file(THUMB).unwrap();
        assert!(image::load_from_memory(&repaired).is_ok());

        // the repaired file is used from now on
        store.reset_calls();
        let again = manager.get_or_create(ORIGINAL, &shock_key()).unwrap();
        assert_eq!(again.dimensions(), THUMBNAIL_SIZE_FULL);
        assert_eq!(store.reads_of(ORIGINAL), 0);
        assert_eq!(store.write_call_count(), 0);
    }

    #[test]
    fn test_failed_persist_still_returns_thumbnail() {
        let mut store = MemoryStore::new();
        store.preload(ORIGINAL, png_bytes(&coordinate_image(256, 360)));
        store.set_failure_modes(false, true);
        let manager = manager(&store);

        let thumbnail = manager.get_or_create(ORIGINAL, &shock_key()).unwrap();
        assert_eq!(thumbnail.dimensions(), THUMBNAIL_SIZE_FULL);
        assert!(!store.exists(THUMB));
        assert_eq!(store.remove_call_count(), 1);
    }

    #[test]
    fn test_missing_original_is_absent() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        assert!(manager.get_or_create(ORIGINAL, &shock_key()).is_none());
        assert_eq!(store.write_call_count(), 0);
    }

    #[test]
    fn test_non_jpeg_original_served_full_size() {
        let store = MemoryStore::new();
        let original = "/images/TOK/Soldier.full.png";
        store.preload(original, png_bytes(&coordinate_image(265, 370)));
        let manager = manager(&store);

        let image = manager.get_or_create(original, &shock_key()).unwrap();
        assert_eq!(image.dimensions(), (256, 360));
        assert_eq!(store.write_call_count(), 0);
    }

    #[test]
    fn test_corrupt_thumbnail_container_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArchiveFileStore::new());
        let original = format!("{}/M10.zip/M10/Shock.full.jpg", dir.path().display());
        let thumb = format!("{}/M10.thumb.zip/M10/Shock.full.jpg", dir.path().display());
        store
            .write(&original, &png_bytes(&coordinate_image(265, 370)))
            .unwrap();
        std::fs::write(dir.path().join("M10.thumb.zip"), b"garbage container").unwrap();

        let manager = ThumbnailManager::new(store.clone(), StorageMode::Archive);
        let thumbnail = manager.get_or_create(&original, &shock_key()).unwrap();
        assert_eq!(thumbnail.dimensions(), THUMBNAIL_SIZE_FULL);

        assert!(store.exists(&thumb));
        let stored = store.read(&thumb).unwrap().unwrap();
        let decoded = image::load_from_memory(&stored).unwrap();
        assert_eq!(decoded.dimensions(), THUMBNAIL_SIZE_FULL);

        // the original container is left alone
        assert!(store.exists(&original));
    }
}
