//! Contact sheet composition
//!
//! Every line crop is scaled to a common width, tiled row-major into a fixed
//! number of columns, and placed on a white canvas. Short thumbnails are
//! padded at the bottom of their row and short rows on the right.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Thumbnails per row
pub const DEFAULT_COLUMNS: usize = 4;

/// Width every thumbnail is scaled to
pub const DEFAULT_THUMB_WIDTH: u32 = 600;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Scale `image` to `width` preserving aspect ratio
pub fn thumbnail(image: &RgbImage, width: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || width == 0 {
        return RgbImage::new(0, 0);
    }
    let height = ((h as u64 * width as u64) / w as u64).max(1) as u32;
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Tile line crops into a single review image
///
/// Returns `None` when there is nothing to show.
pub fn compose(lines: &[&RgbImage], columns: usize, thumb_width: u32) -> Option<RgbImage> {
    let columns = columns.max(1);
    let thumbs: Vec<RgbImage> = lines
        .iter()
        .map(|img| thumbnail(img, thumb_width))
        .filter(|t| t.width() > 0)
        .collect();
    if thumbs.is_empty() {
        return None;
    }

    let rows: Vec<&[RgbImage]> = thumbs.chunks(columns).collect();
    let row_heights: Vec<u32> = rows
        .iter()
        .map(|row| row.iter().map(|t| t.height()).max().unwrap_or(0))
        .collect();
    let sheet_width = rows
        .iter()
        .map(|row| row.iter().map(|t| t.width()).sum::<u32>())
        .max()
        .unwrap_or(0);
    let sheet_height = row_heights.iter().sum();

    let mut sheet = RgbImage::from_pixel(sheet_width, sheet_height, BACKGROUND);
    let mut y = 0i64;
    for (row, row_height) in rows.iter().zip(&row_heights) {
        let mut x = 0i64;
        for thumb in row.iter() {
            imageops::replace(&mut sheet, thumb, x, y);
            x += thumb.width() as i64;
        }
        y += *row_height as i64;
    }
    Some(sheet)
}
