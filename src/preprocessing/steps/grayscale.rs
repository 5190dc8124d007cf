use crate::error::OcrError;
use image::DynamicImage;

/// Convert image to single-channel grayscale
///
/// Images that are already 8-bit luma pass through untouched.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    match image {
        DynamicImage::ImageLuma8(_) => Ok(image),
        other => Ok(DynamicImage::ImageLuma8(other.into_luma8())),
    }
}
