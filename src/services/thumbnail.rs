use image::DynamicImage;
use std::io::Cursor;

pub const MAX_DIMENSION: u32 = 100;
const JPEG_QUALITY: u8 = 80;

/// Thumbnail generation failure. Always recovered by the caller: the parent
/// upload proceeds with a null thumbnail.
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Whether a declared MIME type qualifies for preview generation.
/// Vector and animated formats are excluded since they cannot be safely
/// downsized this way.
pub fn is_previewable(mime_type: &str) -> bool {
    mime_type.starts_with("image/") && !matches!(mime_type, "image/svg+xml" | "image/gif")
}

/// Produce a bounded-dimension JPEG preview of a raster image.
///
/// Preserves aspect ratio and never upscales; output fits within
/// `MAX_DIMENSION` on both axes.
pub fn generate(data: &[u8]) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory(data)?;

    // thumbnail() scales up to fill the bounds, so images already within
    // them are kept at their original dimensions
    let thumb = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img.thumbnail(MAX_DIMENSION, MAX_DIMENSION)
    } else {
        img
    };

    // JPEG has no alpha channel
    let thumb = DynamicImage::ImageRgb8(thumb.to_rgb8());

    let mut buf = Cursor::new(Vec::new());
    thumb.write_to(&mut buf, image::ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    Ok(buf.into_inner())
}
