//! Storage path resolution for card and token images

use crate::key::CardKey;
use crate::store::{StorageMode, VirtualFileStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const CARD_BACK_DIR: &str = "default";
pub const CARD_BACK_FILENAME: &str = "cardback.jpg";
pub const TOKEN_DIR: &str = "TOK";

const FULL_IMAGE_SUFFIX: &str = ".full.jpg";
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', ':', '?', '*', '"', '<', '>', '|'];

/// Where the card database says an image lives.
///
/// `None` means there is legitimately no image for the card.
pub trait ImagePathSource: Send + Sync {
    fn card_image_path(&self, key: &CardKey) -> Option<String>;

    fn token_image_path(&self, key: &CardKey) -> Option<String>;

    /// Fallback image for tokens without artwork of their own
    fn card_back_path(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    pub is_token: bool,
}

pub struct PathResolver {
    source: Arc<dyn ImagePathSource>,
}

impl PathResolver {
    pub fn new(source: Arc<dyn ImagePathSource>) -> Self {
        Self { source }
    }

    /// Map a key to the path its image is stored under.
    ///
    /// Tokens without a token image resolve to the card back; regular cards without a
    /// path resolve to `None`.
    pub fn resolve(&self, key: &CardKey) -> Option<ResolvedPath> {
        if key.is_token() {
            let path = self.source.token_image_path(key).unwrap_or_else(|| {
                debug!(key = %key, "No token image, using card back");
                self.source.card_back_path()
            });
            return Some(ResolvedPath {
                path,
                is_token: true,
            });
        }

        match self.source.card_image_path(key) {
            Some(path) => Some(ResolvedPath {
                path,
                is_token: false,
            }),
            None => {
                debug!(key = %key, "No image path for card");
                None
            }
        }
    }
}

/// The standard on-disk layout of downloaded images.
///
/// Loose mode: `<root>/<SET>/<name>[.<number>].full.jpg`. Archive mode keeps the same
/// entry name inside `<root>/<SET>.zip`. Tokens live under the `TOK` set, in a
/// sub-directory named after their token set when they have one.
pub struct DirectoryLayout {
    root: PathBuf,
    mode: StorageMode,
    store: Arc<dyn VirtualFileStore>,
}

impl DirectoryLayout {
    pub fn new(root: PathBuf, mode: StorageMode, store: Arc<dyn VirtualFileStore>) -> Self {
        Self { root, mode, store }
    }

    /// Full path of `file` inside the directory (or container) for `set`
    fn set_path(&self, set: &str, relative: &str) -> String {
        let path = match self.mode {
            StorageMode::Loose => self.root.join(set).join(relative),
            StorageMode::Archive => self.root.join(format!("{}.zip", set)).join(set).join(relative),
        };
        path.to_string_lossy().into_owned()
    }

    fn full_image_name(name: &str, number: Option<&str>) -> String {
        match number {
            Some(number) => format!("{}.{}{}", name, number, FULL_IMAGE_SUFFIX),
            None => format!("{}{}", name, FULL_IMAGE_SUFFIX),
        }
    }
}

impl ImagePathSource for DirectoryLayout {
    fn card_image_path(&self, key: &CardKey) -> Option<String> {
        let name = sanitize_name(&key.name);
        if name.is_empty() || key.set_code.is_empty() {
            return None;
        }

        let number = key.uses_various_art.then_some(key.collector_id.as_str());
        Some(self.set_path(&key.set_code, &Self::full_image_name(&name, number)))
    }

    fn token_image_path(&self, key: &CardKey) -> Option<String> {
        let name = sanitize_name(&key.name);
        if name.is_empty() {
            return None;
        }

        let descriptor = sanitize_name(&key.token_descriptor);
        let mut file_names = Vec::new();
        if !descriptor.is_empty() {
            file_names.push(format!("{}.{}{}", name, descriptor, FULL_IMAGE_SUFFIX));
        }
        file_names.push(Self::full_image_name(&name, None));

        let token_set = if key.token_set_code.is_empty() {
            &key.set_code
        } else {
            &key.token_set_code
        };

        let mut candidates = Vec::new();
        for file_name in &file_names {
            if !token_set.is_empty() {
                candidates.push(self.set_path(TOKEN_DIR, &format!("{}/{}", token_set, file_name)));
            }
            candidates.push(self.set_path(TOKEN_DIR, file_name));
        }

        candidates.into_iter().find(|path| self.store.exists(path))
    }

    fn card_back_path(&self) -> String {
        self.set_path(CARD_BACK_DIR, CARD_BACK_FILENAME)
    }
}

/// Strip characters that cannot appear in file names
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !FORBIDDEN_NAME_CHARS.contains(c)).collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn layout(mode: StorageMode, store: &MemoryStore) -> DirectoryLayout {
        DirectoryLayout::new(PathBuf::from("/images"), mode, Arc::new(store.clone()))
    }

    fn key(raw: &str) -> CardKey {
        CardKey::parse(raw).unwrap()
    }

    #[test]
    fn test_card_paths_by_mode() {
        let store = MemoryStore::new();
        let shock = key("Shock#M19#1#156##");

        let loose = layout(StorageMode::Loose, &store);
        assert_eq!(
            loose.card_image_path(&shock).as_deref(),
            Some("/images/M19/Shock.full.jpg")
        );

        let archive = layout(StorageMode::Archive, &store);
        assert_eq!(
            archive.card_image_path(&shock).as_deref(),
            Some("/images/M19.zip/M19/Shock.full.jpg")
        );
    }

    #[test]
    fn test_various_art_includes_collector_number() {
        let store = MemoryStore::new();
        let forest = key("Forest#UNH#2#140##usesVariousArt#");
        assert_eq!(
            layout(StorageMode::Loose, &store).card_image_path(&forest).as_deref(),
            Some("/images/UNH/Forest.140.full.jpg")
        );
    }

    #[test]
    fn test_names_are_sanitized() {
        let store = MemoryStore::new();
        let split = key("Fire // Ice#MH2#1#290##");
        assert_eq!(
            layout(StorageMode::Loose, &store).card_image_path(&split).as_deref(),
            Some("/images/MH2/Fire Ice.full.jpg")
        );
    }

    #[test]
    fn test_missing_set_has_no_path() {
        let store = MemoryStore::new();
        let resolver = PathResolver::new(Arc::new(layout(StorageMode::Loose, &store)));
        assert_eq!(resolver.resolve(&key("Shock##1#156##")), None);
    }

    #[test]
    fn test_token_path_found_in_token_set_dir() {
        let store = MemoryStore::new();
        store.preload("/images/TOK/M15/Soldier.full.jpg", vec![1]);
        let resolver = PathResolver::new(Arc::new(layout(StorageMode::Loose, &store)));

        let resolved = resolver.resolve(&key("Soldier#M15#0#0#M15#")).unwrap();
        assert_eq!(resolved.path, "/images/TOK/M15/Soldier.full.jpg");
        assert!(resolved.is_token);
    }

    #[test]
    fn test_token_descriptor_preferred() {
        let store = MemoryStore::new();
        store.preload("/images/TOK/M15/Soldier.full.jpg", vec![1]);
        store.preload("/images/TOK/M15/Soldier.W 11.full.jpg", vec![2]);
        let resolver = PathResolver::new(Arc::new(layout(StorageMode::Loose, &store)));

        let resolved = resolver.resolve(&key("Soldier#M15#0#0#M15#W 1/1")).unwrap();
        assert_eq!(resolved.path, "/images/TOK/M15/Soldier.W 11.full.jpg");
    }

    #[test]
    fn test_token_without_image_falls_back_to_card_back() {
        let store = MemoryStore::new();
        let resolver = PathResolver::new(Arc::new(layout(StorageMode::Loose, &store)));

        let resolved = resolver.resolve(&key("Elemental#OGW#0##OGW#")).unwrap();
        assert_eq!(resolved.path, "/images/default/cardback.jpg");
        assert!(resolved.is_token);
    }

    #[test]
    fn test_card_back_in_archive_mode() {
        let store = MemoryStore::new();
        assert_eq!(
            layout(StorageMode::Archive, &store).card_back_path(),
            "/images/default.zip/default/cardback.jpg"
        );
    }
}
