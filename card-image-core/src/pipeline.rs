//! Decoding and geometric transforms for card images

use crate::error::ImageCacheError;
use crate::store::VirtualFileStore;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgb, RgbImage, Rgba};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Size of untrimmed scans from the card vendor, bleed border included
pub const VENDOR_SOURCE_SIZE: (u32, u32) = (265, 370);
/// Canonical card image size after the vendor crop
pub const CANONICAL_CARD_SIZE: (u32, u32) = (256, 360);

const VENDOR_BORDER: u32 = 5;
/// The cropped source rectangle is 256 px wide but is drawn into 255 destination columns
const VENDOR_DEST_WIDTH: u32 = 255;
const JPEG_QUALITY: u8 = 90;

/// Load and decode the image at `path`.
///
/// Missing files, read errors and undecodable bytes all come back as `None`; none of
/// them is fatal for the caller.
pub fn load(store: &dyn VirtualFileStore, path: &str) -> Option<DynamicImage> {
    let bytes = match store.read(path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(path = %path, store = store.store_name(), "Image file does not exist");
            return None;
        }
        Err(e) => {
            warn!(path = %path, store = store.store_name(), error = %e, "Failed to read image file");
            return None;
        }
    };

    match image::load_from_memory(&bytes) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(path = %path, size_bytes = bytes.len(), error = %e, "Failed to decode image");
            None
        }
    }
}

/// Trim the bleed border off vendor scans.
///
/// A 265×370 image has its source rectangle (5,5)–(261,365) drawn onto the destination
/// rectangle (0,0)–(255,360) of a new 256×360 RGB image using nearest-neighbour sampling
/// at pixel centres; the last destination column stays black and translucent pixels are
/// blended onto black. Any other size is returned untouched.
pub fn apply_vendor_crop(image: DynamicImage) -> DynamicImage {
    if image.dimensions() != VENDOR_SOURCE_SIZE {
        return image;
    }

    let source = image.to_rgba8();
    let (crop_width, crop_height) = CANONICAL_CARD_SIZE;
    let mut crop = RgbImage::new(crop_width, crop_height);

    for dy in 0..crop_height {
        let sy = VENDOR_BORDER + dy;
        for dx in 0..VENDOR_DEST_WIDTH {
            let sx = VENDOR_BORDER + ((2 * dx + 1) * crop_width) / (2 * VENDOR_DEST_WIDTH);
            crop.put_pixel(dx, dy, over_black(*source.get_pixel(sx, sy)));
        }
    }

    DynamicImage::ImageRgb8(crop)
}

/// Composite a pixel onto the black background of the crop
fn over_black(pixel: Rgba<u8>) -> Rgb<u8> {
    let [r, g, b, alpha] = pixel.0;
    let blend = |channel: u8| ((channel as u32 * alpha as u32 + 127) / 255) as u8;
    Rgb([blend(r), blend(g), blend(b)])
}

/// Scale `image` down to fit inside `width`×`height`, keeping its aspect ratio.
///
/// Never upscales: when the image already fits, the same `Arc` is returned.
pub fn resize_to_fit(image: &Arc<DynamicImage>, width: u32, height: u32) -> Arc<DynamicImage> {
    let (src_width, src_height) = image.dimensions();
    if src_width == 0 || src_height == 0 {
        return Arc::clone(image);
    }

    let scale = f64::min(
        width as f64 / src_width as f64,
        height as f64 / src_height as f64,
    );
    if scale >= 1.0 {
        return Arc::clone(image);
    }

    let target_width = scaled_dimension(src_width, scale);
    let target_height = scaled_dimension(src_height, scale);
    Arc::new(resize_exact(image, target_width, target_height))
}

/// Resize to exactly `width`×`height`
pub fn resize_exact(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image.resize_exact(width, height, FilterType::Triangle)
}

fn scaled_dimension(source: u32, scale: f64) -> u32 {
    ((source as f64) * scale).round().max(1.0) as u32
}

/// Encode an image for the backing store: PNG when it has an alpha channel (more than
/// three channels), JPEG otherwise.
pub fn encode_for_storage(image: &DynamicImage) -> Result<Vec<u8>, ImageCacheError> {
    let mut buffer = Cursor::new(Vec::new());
    if image.color().channel_count() > 3 {
        image.write_to(&mut buffer, ImageOutputFormat::Png)?;
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut buffer, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    /// An RGB image whose pixels encode their own coordinates
    pub fn coordinate_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 7) as u8 + 1])
        }))
    }

    pub fn solid_rgba(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128])))
    }

    pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_vendor_crop_dimensions() {
        let cropped = apply_vendor_crop(coordinate_image(265, 370));
        assert_eq!(cropped.dimensions(), (256, 360));
    }

    #[test]
    fn test_vendor_crop_sample_mapping() {
        let source = coordinate_image(265, 370).to_rgb8();
        let cropped = apply_vendor_crop(DynamicImage::ImageRgb8(source.clone())).to_rgb8();

        assert_eq!(cropped.get_pixel(0, 0), source.get_pixel(5, 5));
        assert_eq!(cropped.get_pixel(254, 359), source.get_pixel(260, 364));
        assert_eq!(cropped.get_pixel(127, 180), source.get_pixel(133, 185));
        // the last destination column is never drawn
        for y in 0..360 {
            assert_eq!(cropped.get_pixel(255, y).0, [0, 0, 0]);
        }
    }

    #[test]
    fn test_vendor_crop_blends_alpha_onto_black() {
        // solid_rgba is [10, 20, 30] at alpha 128
        let cropped = apply_vendor_crop(solid_rgba(265, 370)).to_rgb8();
        assert_eq!(cropped.get_pixel(0, 0).0, [5, 10, 15]);
        assert_eq!(cropped.get_pixel(200, 300).0, [5, 10, 15]);
        assert_eq!(cropped.get_pixel(255, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_vendor_crop_is_reproducible() {
        let first = apply_vendor_crop(coordinate_image(265, 370));
        let second = apply_vendor_crop(coordinate_image(265, 370));
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_vendor_crop_ignores_other_sizes() {
        for (w, h) in [(256, 360), (265, 371), (264, 370), (488, 680)] {
            let image = coordinate_image(w, h);
            let result = apply_vendor_crop(image.clone());
            assert_eq!(result.dimensions(), (w, h));
            assert_eq!(result.as_bytes(), image.as_bytes());
        }
    }

    #[test]
    fn test_resize_to_fit_never_upscales() {
        let image = Arc::new(coordinate_image(200, 280));
        let same = resize_to_fit(&image, 400, 400);
        assert!(Arc::ptr_eq(&image, &same));

        let exact = resize_to_fit(&image, 200, 280);
        assert!(Arc::ptr_eq(&image, &exact));
    }

    #[test]
    fn test_resize_to_fit_scales_proportionally() {
        let image = Arc::new(coordinate_image(200, 280));

        // scale = min(100/200, 100/280) = 0.357
        let scaled = resize_to_fit(&image, 100, 100);
        assert_eq!(scaled.dimensions(), (71, 100));

        // scale = min(50/200, 280/280) = 0.25
        let narrow = resize_to_fit(&image, 50, 280);
        assert_eq!(narrow.dimensions(), (50, 70));
    }

    #[test]
    fn test_resize_exact() {
        let image = coordinate_image(256, 360);
        assert_eq!(resize_exact(&image, 102, 146).dimensions(), (102, 146));
    }

    #[test]
    fn test_encode_format_follows_channel_count() {
        let jpeg = encode_for_storage(&coordinate_image(10, 10)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let png = encode_for_storage(&solid_rgba(10, 10)).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_load_outcomes() {
        let store = MemoryStore::new();
        store.preload("good.png", png_bytes(&coordinate_image(20, 30)));
        store.preload("garbage.jpg", b"definitely not an image".to_vec());

        let loaded = load(&store, "good.png").unwrap();
        assert_eq!(loaded.dimensions(), (20, 30));
        assert!(load(&store, "garbage.jpg").is_none());
        assert!(load(&store, "missing.jpg").is_none());
    }

    #[test]
    fn test_load_read_error_is_absent() {
        let mut store = MemoryStore::new();
        store.preload("good.png", png_bytes(&coordinate_image(20, 30)));
        store.set_failure_modes(true, false);
        assert!(load(&store, "good.png").is_none());
    }
}
