pub mod cache;
pub mod card;
pub mod config;
pub mod error;
pub mod image_cache;
pub mod key;
pub mod paths;
pub mod pipeline;
pub mod store;
pub mod thumbnail;

pub use cache::{CacheConfig, CacheStats, ComputingCache};
pub use card::CardView;
pub use config::CacheSettings;
pub use error::ImageCacheError;
pub use image_cache::{CARD_SIZE_FULL, CardImageCache};
pub use key::{CardKey, ImageRequest};
pub use paths::{DirectoryLayout, ImagePathSource, PathResolver, ResolvedPath};
pub use store::{StorageMode, VirtualFileStore, open_store};
pub use thumbnail::{THUMBNAIL_SIZE_FULL, ThumbnailManager};
