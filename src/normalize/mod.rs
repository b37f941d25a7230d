//! Page Normalization module
//!
//! Turns one raw manuscript photograph into a normalized page raster by
//! applying an ordered set of independently togglable corrections:
//!
//! 1. Auto-crop to the page boundary ([`crop`])
//! 2. Deskew via Hough line angles ([`deskew`])
//! 3. Contrast-limited local equalization on luminance ([`contrast`])
//! 4. Edge-preserving non-local means denoise ([`denoise`])
//! 5. Unsharp-style 3x3 sharpen ([`sharpen`])
//!
//! Every stage returns its input untouched when its detection is degenerate
//! (no contour, no lines), so normalization never fails after decode.
//!
//! # Example
//!
//! ```rust,no_run
//! use manuscript_prep::{NormalizeOptions, PageNormalizer};
//! use std::path::Path;
//!
//! let options = NormalizeOptions::builder()
//!     .crop(true)
//!     .deskew(true)
//!     .contrast(true)
//!     .build();
//!
//! let normalizer = PageNormalizer::new(options);
//! let report = normalizer
//!     .normalize_file(Path::new("images/1839-04-05.jpg"), Path::new("out/1839-04-05.jpg"))
//!     .unwrap();
//! println!("skew: {:?}", report.skew_angle);
//! ```

pub mod contrast;
pub mod crop;
pub mod denoise;
pub mod deskew;
pub mod sharpen;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::raster::{self, ARCHIVAL_JPEG_QUALITY};
use crate::segment::Region;

// ============================================================
// Constants
// ============================================================

/// Default crop padding as a fraction of the shorter crop side
pub const DEFAULT_CROP_PADDING: f64 = 0.02;

/// Default minimum retained area fraction for an accepted crop
pub const DEFAULT_MIN_AREA_FRACTION: f64 = 0.7;

// ============================================================
// Options
// ============================================================

/// Page normalization toggles
///
/// Bound once per batch and never mutated while pages are processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Crop to the largest detected contour
    pub crop: bool,
    /// Padding fraction around the detected crop
    pub crop_padding: f64,
    /// Reject crops keeping less than this fraction of the original area
    pub min_area_fraction: f64,
    /// Estimate and correct page rotation
    pub deskew: bool,
    /// CLAHE on the luminance channel
    pub contrast: bool,
    /// Non-local means denoise
    pub denoise: bool,
    /// 3x3 sharpening kernel
    pub sharpen: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            crop: false,
            crop_padding: DEFAULT_CROP_PADDING,
            min_area_fraction: DEFAULT_MIN_AREA_FRACTION,
            deskew: false,
            contrast: false,
            denoise: false,
            sharpen: false,
        }
    }
}

impl NormalizeOptions {
    /// Create a new options builder
    pub fn builder() -> NormalizeOptionsBuilder {
        NormalizeOptionsBuilder::default()
    }

    /// Every stage enabled (the "processed_full" page set)
    pub fn full() -> Self {
        Self {
            crop: true,
            deskew: true,
            contrast: true,
            denoise: true,
            sharpen: true,
            ..Default::default()
        }
    }

    /// Every stage except crop (the "processed_safe_crop" page set)
    pub fn safe_crop() -> Self {
        Self {
            crop: false,
            ..Self::full()
        }
    }

    /// Whether any stage is enabled at all
    pub fn any_enabled(&self) -> bool {
        self.crop || self.deskew || self.contrast || self.denoise || self.sharpen
    }
}

/// Builder for NormalizeOptions
#[derive(Debug, Default)]
pub struct NormalizeOptionsBuilder {
    options: NormalizeOptions,
}

impl NormalizeOptionsBuilder {
    /// Enable auto-crop
    #[must_use]
    pub fn crop(mut self, enabled: bool) -> Self {
        self.options.crop = enabled;
        self
    }

    /// Set crop padding fraction (negative values are treated as 0)
    #[must_use]
    pub fn crop_padding(mut self, fraction: f64) -> Self {
        self.options.crop_padding = fraction.max(0.0);
        self
    }

    /// Set minimum retained area fraction (0.0-1.0)
    #[must_use]
    pub fn min_area_fraction(mut self, fraction: f64) -> Self {
        self.options.min_area_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Enable deskew
    #[must_use]
    pub fn deskew(mut self, enabled: bool) -> Self {
        self.options.deskew = enabled;
        self
    }

    /// Enable contrast enhancement
    #[must_use]
    pub fn contrast(mut self, enabled: bool) -> Self {
        self.options.contrast = enabled;
        self
    }

    /// Enable denoise
    #[must_use]
    pub fn denoise(mut self, enabled: bool) -> Self {
        self.options.denoise = enabled;
        self
    }

    /// Enable sharpen
    #[must_use]
    pub fn sharpen(mut self, enabled: bool) -> Self {
        self.options.sharpen = enabled;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> NormalizeOptions {
        self.options
    }
}

// ============================================================
// Report
// ============================================================

/// What the normalizer actually did to a page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    /// Input dimensions
    pub original_size: (u32, u32),
    /// Output dimensions
    pub output_size: (u32, u32),
    /// Crop rectangle applied, if the crop was accepted
    pub crop: Option<Region>,
    /// Estimated skew in degrees (None when deskew was disabled)
    pub skew_angle: Option<f64>,
    /// Whether a rotation was actually applied
    pub rotated: bool,
    /// Stages that ran (in order)
    pub stages: Vec<&'static str>,
}

// ============================================================
// Normalizer
// ============================================================

/// Page normalizer
#[derive(Debug, Clone, Default)]
pub struct PageNormalizer {
    options: NormalizeOptions,
}

impl PageNormalizer {
    /// Create a normalizer bound to one set of options
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Options this normalizer was built with
    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Normalize a raster, returning only the output
    pub fn normalize(&self, raster: &RgbImage) -> RgbImage {
        self.normalize_with_report(raster).0
    }

    /// Normalize a raster and report which corrections were applied
    #[instrument(skip_all, fields(width = raster.width(), height = raster.height()))]
    pub fn normalize_with_report(&self, raster: &RgbImage) -> (RgbImage, NormalizeReport) {
        let opts = &self.options;
        let mut report = NormalizeReport {
            original_size: raster.dimensions(),
            ..Default::default()
        };
        let mut current: Cow<'_, RgbImage> = Cow::Borrowed(raster);

        if opts.crop {
            report.stages.push("crop");
            if let Some((cropped, region)) =
                crop::auto_crop(&current, opts.crop_padding, opts.min_area_fraction)
            {
                debug!(?region, "Crop accepted");
                report.crop = Some(region);
                current = Cow::Owned(cropped);
            }
        }

        if opts.deskew {
            report.stages.push("deskew");
            let outcome = deskew::deskew(&current);
            report.skew_angle = Some(outcome.angle);
            if let Some(rotated) = outcome.image {
                report.rotated = true;
                current = Cow::Owned(rotated);
            }
        }

        if opts.contrast {
            report.stages.push("contrast");
            current = Cow::Owned(contrast::enhance_contrast(&current));
        }

        if opts.denoise {
            report.stages.push("denoise");
            current = Cow::Owned(denoise::denoise(&current));
        }

        if opts.sharpen {
            report.stages.push("sharpen");
            current = Cow::Owned(sharpen::sharpen(&current));
        }

        let output = current.into_owned();
        report.output_size = output.dimensions();
        (output, report)
    }

    /// Decode `input`, normalize it, and write the result as JPEG to `output`
    #[instrument(skip(self), fields(input = %input.display()))]
    pub fn normalize_file(&self, input: &Path, output: &Path) -> raster::Result<NormalizeReport> {
        let page = raster::load(input)?;
        let (normalized, report) = self.normalize_with_report(&page);
        raster::save_jpeg(&normalized, output, ARCHIVAL_JPEG_QUALITY)?;

        info!(
            output = %output.display(),
            stages = ?report.stages,
            width = report.output_size.0,
            height = report.output_size.1,
            "Page normalized"
        );
        Ok(report)
    }
}
