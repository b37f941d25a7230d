//! Auto-crop to the photographed page boundary
//!
//! The page boundary is taken to be the outer contour of the Canny edge map
//! with the largest enclosed area. The crop is padded and then rejected when
//! it would keep less than the configured fraction of the original pixels,
//! which protects pages from a spurious small contour.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::BorderType;
use imageproc::edges::canny;
use tracing::debug;

use crate::filters::{
    convolve_separable, gaussian_kernel, outer_border_contours, polygon_area,
    sigma_for_kernel_size,
};
use crate::segment::Region;

/// Blur kernel size applied before edge detection
const BLUR_KERNEL_SIZE: usize = 5;

/// Canny hysteresis thresholds
pub(crate) const CANNY_LOW: f32 = 50.0;
pub(crate) const CANNY_HIGH: f32 = 150.0;

/// Fixed 5x5 Gaussian blur, replicated border
fn blur(gray: &GrayImage) -> GrayImage {
    let kernel = gaussian_kernel(BLUR_KERNEL_SIZE, sigma_for_kernel_size(BLUR_KERNEL_SIZE));
    let plane: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32).collect();
    let smoothed = convolve_separable(&plane, gray.width(), gray.height(), &kernel);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = smoothed[(y * gray.width() + x) as usize];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Bounding rectangle of the outermost edge contour with the largest area
pub fn find_page_boundary(gray: &GrayImage) -> Option<Region> {
    let edges = canny(&blur(gray), CANNY_LOW, CANNY_HIGH);
    let contours = outer_border_contours(&edges);

    let mut best: Option<(f64, Region)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
    {
        if contour.points.is_empty() {
            continue;
        }
        let polygon: Vec<(f64, f64)> = contour
            .points
            .iter()
            .map(|p| (p.x as f64, p.y as f64))
            .collect();
        let area = polygon_area(&polygon);

        // First maximum wins on ties
        if best.as_ref().map_or(true, |(a, _)| area > *a) {
            let points = contour.points.iter().map(|p| (p.x, p.y));
            if let Some(rect) = Region::bounding(points) {
                best = Some((area, rect));
            }
        }
    }

    best.map(|(_, rect)| rect)
}

/// Expand `rect` by `pad_fraction` of its shorter side, clamped to the image
pub fn pad_region(rect: Region, pad_fraction: f64, image_width: u32, image_height: u32) -> Region {
    let pad = (rect.width.min(rect.height) as f64 * pad_fraction.max(0.0)) as u32;
    let x = rect.x.saturating_sub(pad);
    let y = rect.y.saturating_sub(pad);
    let width = (rect.width + 2 * pad).min(image_width.saturating_sub(x));
    let height = (rect.height + 2 * pad).min(image_height.saturating_sub(y));
    Region::new(x, y, width, height)
}

/// Crop `image` to its detected page boundary
///
/// Returns `None` (keep the original) when no contour is found, the image is
/// empty, or the padded crop retains less than `min_area_fraction` of the
/// original area.
pub fn auto_crop(
    image: &RgbImage,
    pad_fraction: f64,
    min_area_fraction: f64,
) -> Option<(RgbImage, Region)> {
    let (width, height) = image.dimensions();
    let orig_area = width as u64 * height as u64;
    if orig_area == 0 {
        return None;
    }

    let gray = image::DynamicImage::ImageRgb8(image.clone()).to_luma8();
    let Some(boundary) = find_page_boundary(&gray) else {
        debug!("No page contour found; keeping original");
        return None;
    };

    let crop = pad_region(boundary, pad_fraction, width, height);
    let retained = crop.area() as f64 / orig_area as f64;
    if retained < min_area_fraction {
        debug!(
            retained,
            min_area_fraction, "Crop would discard too much of the page; keeping original"
        );
        return None;
    }

    let cropped = crate::raster::crop_region(image, &crop);
    Some((cropped, crop))
}
