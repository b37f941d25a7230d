//! Raster I/O helpers
//!
//! Every stage works on an owned [`RgbImage`]. Decoding failures surface as
//! [`RasterError::Read`] / [`RasterError::NotFound`]; everything after decode
//! is infallible image arithmetic.

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::segment::Region;

/// JPEG quality for archival normalized pages and line crops
pub const ARCHIVAL_JPEG_QUALITY: u8 = 95;

/// JPEG quality for visualization artifacts (overlay, contact sheet)
pub const PREVIEW_JPEG_QUALITY: u8 = 90;

/// Raster error types
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Image not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read image {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RasterError {
    /// Whether this is a decode/read failure (as opposed to a write failure)
    pub fn is_read_error(&self) -> bool {
        matches!(self, RasterError::NotFound(_) | RasterError::Read { .. })
    }
}

pub type Result<T> = std::result::Result<T, RasterError>;

/// Decode a page raster from disk as 8-bit RGB
pub fn load(path: &Path) -> Result<RgbImage> {
    if !path.exists() {
        return Err(RasterError::NotFound(path.to_path_buf()));
    }

    let img = image::open(path).map_err(|e| RasterError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(img.to_rgb8())
}

/// Encode a raster as JPEG, creating parent directories as needed
pub fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| RasterError::Encode(e.to_string()))?;

    Ok(())
}

/// Copy the pixels of `region` out of `image`, clamped to the image bounds
pub fn crop_region(image: &RgbImage, region: &Region) -> RgbImage {
    let (width, height) = image.dimensions();
    let x = region.x.min(width);
    let y = region.y.min(height);
    let w = region.width.min(width - x);
    let h = region.height.min(height - y);
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}

/// Replicate a single channel into an RGB raster
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let (width, height) = gray.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        image::Rgb([v, v, v])
    })
}
