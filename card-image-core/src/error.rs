use std::fmt;

#[derive(Debug)]
pub enum ImageCacheError {
    /// The key string does not match the six-field grammar. Raised by callers
    /// that built a bad key; never cached and never turned into an absence.
    MalformedKey(String),
    Io(std::io::Error),
    Image(image::ImageError),
    Archive(zip::result::ZipError),
    Json(serde_json::Error),
}

impl fmt::Display for ImageCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageCacheError::MalformedKey(key) => write!(
                f,
                "Malformed image key (expected <name>#<set>#<type>#<collectorId>#<tokenSet>#<tokenDescriptor>): {}",
                key
            ),
            ImageCacheError::Io(e) => write!(f, "IO error: {}", e),
            ImageCacheError::Image(e) => write!(f, "Image error: {}", e),
            ImageCacheError::Archive(e) => write!(f, "Archive error: {}", e),
            ImageCacheError::Json(e) => write!(f, "JSON parsing error: {}", e),
        }
    }
}

impl std::error::Error for ImageCacheError {}

impl ImageCacheError {
    pub fn is_malformed_key(&self) -> bool {
        matches!(self, ImageCacheError::MalformedKey(_))
    }
}

impl From<std::io::Error> for ImageCacheError {
    fn from(err: std::io::Error) -> Self {
        ImageCacheError::Io(err)
    }
}

impl From<image::ImageError> for ImageCacheError {
    fn from(err: image::ImageError) -> Self {
        ImageCacheError::Image(err)
    }
}

impl From<zip::result::ZipError> for ImageCacheError {
    fn from(err: zip::result::ZipError) -> Self {
        ImageCacheError::Archive(err)
    }
}

impl From<serde_json::Error> for ImageCacheError {
    fn from(err: serde_json::Error) -> Self {
        ImageCacheError::Json(err)
    }
}
