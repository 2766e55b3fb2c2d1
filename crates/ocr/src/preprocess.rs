use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Image has no pixels")]
    Empty,
}

/// Decode raw image bytes (JPEG / PNG / WEBP / …) into a grayscale raster.
pub fn decode_raster(data: &[u8]) -> Result<GrayImage, PreprocessError> {
    to_gray(image::load_from_memory(data)?)
}

/// Load an image file into a grayscale raster.
pub fn open_raster(path: &Path) -> Result<GrayImage, PreprocessError> {
    to_gray(image::open(path)?)
}

pub fn to_gray(img: DynamicImage) -> Result<GrayImage, PreprocessError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(PreprocessError::Empty);
    }
    Ok(img.to_luma8())
}

/// Shrink `gray` so its longest side is at most `max_side`. Smaller images
/// are returned unchanged.
pub fn downscale_for_preview(gray: &GrayImage, max_side: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let scale = max_side as f64 / w.max(h).max(1) as f64;
    if scale >= 1.0 {
        return gray.clone();
    }
    let nw = ((w as f64 * scale) as u32).max(1);
    let nh = ((h as f64 * scale) as u32).max(1);
    image::imageops::resize(gray, nw, nh, FilterType::Triangle)
}
