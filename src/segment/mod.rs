//! Line segmentation module
//!
//! Splits a normalized page into individual handwritten-line crops for
//! line-by-line transcription.
//!
//! # Features
//!
//! - **Detection** ([`detect`]) - adaptive threshold + dilation line blobs
//! - **Merge** ([`merge`]) - greedy merge of overlapping candidates
//! - **Contact sheet** ([`contact_sheet`]) - tiled review image
//!
//! An optional [`TextRecognizer`] may be attached; its failures are logged
//! and never abort segmentation.

pub mod contact_sheet;
pub mod detect;
pub mod merge;
mod types;

use image::{DynamicImage, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::raster;
use crate::recognizer::TextRecognizer;

pub use contact_sheet::{DEFAULT_COLUMNS, DEFAULT_THUMB_WIDTH};
pub use detect::LineBounds;
pub use merge::MERGE_OVERLAP_FACTOR;
pub use types::{LineArtifact, Region, SegmentOutput};

/// Overlay outline color
pub const OVERLAY_COLOR: image::Rgb<u8> = image::Rgb([0, 255, 0]);

/// Overlay outline thickness in pixels
pub const OVERLAY_THICKNESS: u32 = 2;

// ============================================================
// Options
// ============================================================

/// What to produce besides the line crops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Draw region outlines over the source page
    pub overlay: bool,
    /// Compose a contact sheet of all lines
    pub contact_sheet: bool,
    /// Contact sheet columns
    pub columns: usize,
    /// Contact sheet thumbnail width
    pub thumb_width: u32,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            overlay: false,
            contact_sheet: false,
            columns: DEFAULT_COLUMNS,
            thumb_width: DEFAULT_THUMB_WIDTH,
        }
    }
}

impl SegmentOptions {
    pub fn builder() -> SegmentOptionsBuilder {
        SegmentOptionsBuilder::default()
    }
}

/// Builder for SegmentOptions
#[derive(Debug, Default)]
pub struct SegmentOptionsBuilder {
    options: SegmentOptions,
}

impl SegmentOptionsBuilder {
    #[must_use]
    pub fn overlay(mut self, enabled: bool) -> Self {
        self.options.overlay = enabled;
        self
    }

    #[must_use]
    pub fn contact_sheet(mut self, enabled: bool) -> Self {
        self.options.contact_sheet = enabled;
        self
    }

    /// Contact sheet columns (at least 1)
    #[must_use]
    pub fn columns(mut self, columns: usize) -> Self {
        self.options.columns = columns.max(1);
        self
    }

    /// Contact sheet thumbnail width (at least 1)
    #[must_use]
    pub fn thumb_width(mut self, width: u32) -> Self {
        self.options.thumb_width = width.max(1);
        self
    }

    #[must_use]
    pub fn build(self) -> SegmentOptions {
        self.options
    }
}

// ============================================================
// Segmenter
// ============================================================

/// Line segmenter with an optional advisory recognizer
#[derive(Default)]
pub struct LineSegmenter {
    options: SegmentOptions,
    recognizer: Option<Box<dyn TextRecognizer>>,
}

impl fmt::Debug for LineSegmenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSegmenter")
            .field("options", &self.options)
            .field("recognizer", &self.recognizer.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl LineSegmenter {
    pub fn new(options: SegmentOptions) -> Self {
        Self {
            options,
            recognizer: None,
        }
    }

    /// Attach a recognizer that is asked for text on every line crop
    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Final line regions plus, when enabled, the QA overlay
    pub fn segment(&self, page: &RgbImage) -> (Vec<Region>, Option<RgbImage>) {
        let regions = find_lines(page);
        let overlay = self.options.overlay.then(|| draw_overlay(page, &regions));
        (regions, overlay)
    }

    /// Full per-page segmentation: regions, crops, advisory text, visuals
    #[instrument(skip_all, fields(width = page.width(), height = page.height()))]
    pub fn run(&self, page: &RgbImage) -> SegmentOutput {
        let (regions, overlay) = self.segment(page);

        let lines: Vec<LineArtifact> = regions
            .iter()
            .enumerate()
            .map(|(i, region)| {
                let image = enhance_line(&raster::crop_region(page, region));
                let text = self.recognize(i + 1, &image);
                LineArtifact {
                    ordinal: i + 1,
                    region: *region,
                    image,
                    text,
                }
            })
            .collect();

        let contact_sheet = if self.options.contact_sheet {
            let crops: Vec<&RgbImage> = lines.iter().map(|l| &l.image).collect();
            contact_sheet::compose(&crops, self.options.columns, self.options.thumb_width)
        } else {
            None
        };

        debug!(lines = lines.len(), "Page segmented");
        SegmentOutput {
            regions,
            lines,
            overlay,
            contact_sheet,
        }
    }

    fn recognize(&self, ordinal: usize, line: &RgbImage) -> Option<String> {
        let recognizer = self.recognizer.as_ref()?;
        match recognizer.recognize(line) {
            Ok(text) => text,
            Err(e) => {
                warn!(ordinal, recognizer = recognizer.name(), "Skipping advisory text: {}", e);
                None
            }
        }
    }
}

/// Detect, filter, sort and merge line regions
pub fn find_lines(page: &RgbImage) -> Vec<Region> {
    let candidates = detect::detect_candidates(page);
    merge::merge_regions(&candidates)
}

/// Grayscale and equalize a line crop for readability
pub fn enhance_line(crop: &RgbImage) -> RgbImage {
    if crop.width() == 0 || crop.height() == 0 {
        return crop.clone();
    }
    let gray = DynamicImage::ImageRgb8(crop.clone()).to_luma8();
    raster::gray_to_rgb(&equalize_histogram(&gray))
}

/// Copy of `page` with every region outlined
pub fn draw_overlay(page: &RgbImage, regions: &[Region]) -> RgbImage {
    let mut canvas = page.clone();
    for region in regions {
        for t in 0..OVERLAY_THICKNESS {
            let rect = Rect::at(region.x as i32 - t as i32, region.y as i32 - t as i32)
                .of_size(region.width + 1 + 2 * t, region.height + 1 + 2 * t);
            draw_hollow_rect_mut(&mut canvas, rect, OVERLAY_COLOR);
        }
    }
    canvas
}
