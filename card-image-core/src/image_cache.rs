//! Card image cache
//!
//! [`CardImageCache`] is the object the client constructs once at startup and hands to
//! everything that draws cards. Lookups by [`CardView`] never fail; the worst outcome is
//! `None` for a card without a usable image. Only raw key strings can be rejected, as
//! malformed.

use crate::cache::{CacheConfig, CacheStats, CacheWeight, ComputingCache};
use crate::card::CardView;
use crate::config::CacheSettings;
use crate::error::ImageCacheError;
use crate::key::{CardKey, ImageRequest};
use crate::paths::{DirectoryLayout, ImagePathSource, PathResolver};
use crate::pipeline;
use crate::store::{self, StorageMode, VirtualFileStore};
use crate::thumbnail::{THUMBNAIL_SIZE_FULL, ThumbnailManager};
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Pixel size of a card drawn at normal size
pub const CARD_SIZE_FULL: (u32, u32) = (101, 149);

/// Widths below the thumbnail width plus this margin are served from thumbnails
const THUMBNAIL_ROUTING_MARGIN: u32 = 10;

impl CacheWeight for Arc<DynamicImage> {
    fn weight_bytes(&self) -> u64 {
        self.as_bytes().len() as u64
    }
}

/// The computation run on a cache miss
struct CardImageLoader {
    store: Arc<dyn VirtualFileStore>,
    resolver: PathResolver,
    thumbnails: ThumbnailManager,
}

impl CardImageLoader {
    fn load(&self, key: &CardKey) -> Option<Arc<DynamicImage>> {
        let resolved = self.resolver.resolve(key)?;

        let image = if key.thumbnail {
            self.thumbnails.get_or_create(&resolved.path, key)
        } else {
            pipeline::load(self.store.as_ref(), &resolved.path).map(pipeline::apply_vendor_crop)
        };

        match image {
            Some(image) => {
                debug!(
                    key = %key,
                    path = %resolved.path,
                    is_token = resolved.is_token,
                    dimensions = ?image.dimensions(),
                    "Loaded card image"
                );
                Some(Arc::new(image))
            }
            None => {
                debug!(key = %key, path = %resolved.path, "No usable image for card");
                None
            }
        }
    }
}

pub struct CardImageCache {
    images: ComputingCache<CardKey, Arc<DynamicImage>>,
    source: Arc<dyn ImagePathSource>,
    store: Arc<dyn VirtualFileStore>,
}

impl CardImageCache {
    /// Create a cache over the standard directory layout described by `settings`
    pub fn new(settings: &CacheSettings) -> Self {
        let store = store::open_store(settings.storage_mode);
        let layout = DirectoryLayout::new(
            settings.image_root.clone(),
            settings.storage_mode,
            Arc::clone(&store),
        );
        info!(
            image_root = %settings.image_root.display(),
            storage_mode = %settings.storage_mode,
            "Creating card image cache"
        );
        Self::with_components(store, Arc::new(layout), settings.storage_mode, settings.cache_config())
    }

    /// Create a cache from explicit collaborators
    pub fn with_components(
        store: Arc<dyn VirtualFileStore>,
        source: Arc<dyn ImagePathSource>,
        mode: StorageMode,
        config: CacheConfig,
    ) -> Self {
        let loader = CardImageLoader {
            store: Arc::clone(&store),
            resolver: PathResolver::new(Arc::clone(&source)),
            thumbnails: ThumbnailManager::new(Arc::clone(&store), mode),
        };
        let images = ComputingCache::new("card-images", config, move |key: &CardKey| {
            Ok(loader.load(key))
        });

        Self {
            images,
            source,
            store,
        }
    }

    /// Look up an image by its key string.
    ///
    /// A key that does not follow the key grammar is a caller bug and is returned as
    /// [`ImageCacheError::MalformedKey`]; it is never cached.
    pub fn get(&self, raw_key: &str) -> Result<Option<Arc<DynamicImage>>, ImageCacheError> {
        let key = CardKey::parse(raw_key).map_err(|e| {
            error!(key = %raw_key, error = %e, "Rejected malformed image key");
            e
        })?;
        Ok(self.get_by_key(&key))
    }

    /// Like [`get`](Self::get) but only returns images that are already loaded
    pub fn try_get(&self, raw_key: &str) -> Result<Option<Arc<DynamicImage>>, ImageCacheError> {
        let key = CardKey::parse(raw_key)?;
        Ok(self.images.try_get(&cache_key(key)))
    }

    pub fn get_original(&self, card: &CardView) -> Option<Arc<DynamicImage>> {
        self.get_by_key(&CardKey::for_card(card, &card.name, &ImageRequest::Original))
    }

    /// Image of the other face of a flip or transform card
    pub fn get_original_alternate_name(&self, card: &CardView) -> Option<Arc<DynamicImage>> {
        let alternate_name = card.alternate_name.as_deref()?;
        self.get_by_key(&CardKey::for_card(card, alternate_name, &ImageRequest::Original))
    }

    pub fn get_thumbnail(&self, card: &CardView) -> Option<Arc<DynamicImage>> {
        self.get_by_key(&CardKey::for_card(card, &card.name, &ImageRequest::Thumbnail))
    }

    /// Thumbnail if it is already loaded; never blocks on storage
    pub fn try_get_thumbnail(&self, card: &CardView) -> Option<Arc<DynamicImage>> {
        let key = CardKey::for_card(card, &card.name, &ImageRequest::Thumbnail);
        self.images.try_get(&cache_key(key))
    }

    /// Image to display `card` in a `width`×`height` box.
    ///
    /// Narrow boxes get the thumbnail. Otherwise the full image is scaled down to fit;
    /// it is never scaled up, so larger boxes receive the full image as is.
    pub fn get_scaled(&self, card: &CardView, width: u32, height: u32) -> Option<Arc<DynamicImage>> {
        if uses_thumbnail(width) {
            return self.get_thumbnail(card);
        }

        let key = CardKey::for_card(card, &card.name, &ImageRequest::Width(width));
        let Some(original) = self.get_by_key(&key) else {
            debug!(key = %key, "Image not found");
            return None;
        };
        Some(pipeline::resize_to_fit(&original, width, height))
    }

    /// Like [`get_scaled`](Self::get_scaled) but only from images that are already loaded
    pub fn try_get_scaled(&self, card: &CardView, width: u32, height: u32) -> Option<Arc<DynamicImage>> {
        if uses_thumbnail(width) {
            return self.try_get_thumbnail(card);
        }

        let key = CardKey::for_card(card, &card.name, &ImageRequest::Width(width));
        let Some(original) = self.images.try_get(&cache_key(key.clone())) else {
            debug!(key = %key, "Image not loaded yet");
            return None;
        };
        Some(pipeline::resize_to_fit(&original, width, height))
    }

    /// Face-down image for morph creatures
    pub fn get_morph_image(&self) -> Option<Arc<DynamicImage>> {
        self.load_token_art("Morph", "KTK")
    }

    /// Face-down image for manifested cards
    pub fn get_manifest_image(&self) -> Option<Arc<DynamicImage>> {
        self.load_token_art("Manifest", "FRF")
    }

    /// Resize `original` to the normal card size, unless it already has that size
    pub fn normal_size_image(original: &Arc<DynamicImage>) -> Arc<DynamicImage> {
        let (width, height) = CARD_SIZE_FULL;
        if original.dimensions() == CARD_SIZE_FULL {
            return Arc::clone(original);
        }
        Arc::new(pipeline::resize_exact(original, width, height))
    }

    pub fn stats(&self) -> CacheStats {
        self.images.stats()
    }

    /// Drop every loaded image; the next request loads it again
    pub fn clear(&self) {
        self.images.clear();
    }

    fn get_by_key(&self, key: &CardKey) -> Option<Arc<DynamicImage>> {
        let Ok(image) = self.images.get(&cache_key(key.clone()));
        image
    }

    /// Token artwork loaded straight from storage, without the card back fallback
    fn load_token_art(&self, name: &str, set_code: &str) -> Option<Arc<DynamicImage>> {
        let key = CardKey::for_card(&CardView::token(name, set_code), name, &ImageRequest::Original);
        let path = self.source.token_image_path(&key)?;
        pipeline::load(self.store.as_ref(), &path).map(Arc::new)
    }
}

fn uses_thumbnail(width: u32) -> bool {
    THUMBNAIL_SIZE_FULL.0 + THUMBNAIL_ROUTING_MARGIN > width
}

/// Sized requests share the entry of the full image they are scaled from
fn cache_key(key: CardKey) -> CardKey {
    CardKey {
        size_param: None,
        ..key
    }
}
