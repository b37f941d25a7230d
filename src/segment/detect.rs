//! Candidate line detection
//!
//! Pipeline: grayscale, global histogram equalization, Gaussian adaptive
//! threshold (inverted so ink is foreground), 3x3 median, wide horizontal
//! dilation, outer contours, bounding rectangles, geometric filter, sort.

use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::contours::BorderType;
use imageproc::contrast::equalize_histogram;
use imageproc::filter::median_filter;
use tracing::{debug, instrument};

use super::types::Region;
use crate::filters::{adaptive_threshold_inv, dilate_rect, outer_border_contours};

// ============================================================
// Constants
// ============================================================

/// Neighbourhood size of the adaptive threshold
pub const THRESHOLD_BLOCK_SIZE: usize = 31;

/// Offset subtracted from the local mean
pub const THRESHOLD_OFFSET: f32 = 12.0;

/// Median filter radius (3x3)
pub const MEDIAN_RADIUS: u32 = 1;

/// Minimum width of the dilation kernel
pub const MIN_DILATE_WIDTH: u32 = 25;

/// Height of the dilation kernel
pub const DILATE_HEIGHT: u32 = 3;

/// Plausible single-line size range for a page of `width` x `height`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBounds {
    pub min_height: u32,
    pub max_height: u32,
    pub min_width: u32,
}

impl LineBounds {
    pub fn for_page(width: u32, height: u32) -> Self {
        Self {
            min_height: (height / 100).max(12),
            max_height: (height / 12).max(15),
            min_width: width / 6,
        }
    }

    pub fn accepts(&self, region: &Region) -> bool {
        (self.min_height..=self.max_height).contains(&region.height)
            && region.width >= self.min_width
    }
}

/// Dilation kernel width for a page `width` pixels wide
pub fn dilate_width(width: u32) -> u32 {
    (width / 50).max(MIN_DILATE_WIDTH)
}

/// Binary mask where each text line is one connected blob
pub fn line_mask(gray: &GrayImage) -> GrayImage {
    let equalized = equalize_histogram(gray);
    let binary = adaptive_threshold_inv(&equalized, THRESHOLD_BLOCK_SIZE, THRESHOLD_OFFSET);
    let despeckled = median_filter(&binary, MEDIAN_RADIUS, MEDIAN_RADIUS);
    dilate_rect(&despeckled, dilate_width(gray.width()), DILATE_HEIGHT)
}

/// Bounding rectangles of the outer contours of a mask
pub fn blob_regions(mask: &GrayImage) -> Vec<Region> {
    outer_border_contours(mask)
        .iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
        .filter_map(|c| Region::bounding(c.points.iter().map(|p| (p.x, p.y))))
        .collect()
}

/// Keep plausible line rectangles and sort them by top edge
pub fn filter_regions(regions: Vec<Region>, width: u32, height: u32) -> Vec<Region> {
    let bounds = LineBounds::for_page(width, height);
    let mut kept: Vec<Region> = regions.into_iter().filter(|r| bounds.accepts(r)).collect();
    kept.sort_by_key(|r| r.y);
    kept
}

/// Detect candidate line regions on a page, sorted top to bottom
#[instrument(skip_all, fields(width = page.width(), height = page.height()))]
pub fn detect_candidates(page: &RgbImage) -> Vec<Region> {
    let (width, height) = page.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let gray = DynamicImage::ImageRgb8(page.clone()).to_luma8();
    let mask = line_mask(&gray);
    let blobs = blob_regions(&mask);
    let total = blobs.len();
    let kept = filter_regions(blobs, width, height);
    debug!(blobs = total, kept = kept.len(), "Line candidates detected");
    kept
}
