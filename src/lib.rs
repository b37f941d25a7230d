//! manuscript-prep - Page normalization and line segmentation for
//! handwritten manuscript transcription
//!
//! # Pipeline
//!
//! 1. [`normalize`] turns a raw page photograph into a cleaned, level page
//! 2. [`segment`] splits a page into per-line crops with optional advisory
//!    text from a [`TextRecognizer`]
//!
//! Pages are independent; [`batch`] runs either stage over many pages in
//! parallel and collects per-page failures.
//!
//! # Example
//!
//! ```rust,no_run
//! use manuscript_prep::{LineSegmenter, NormalizeOptions, PageNormalizer, SegmentOptions};
//!
//! let page = manuscript_prep::raster::load("images/1839-04-05.jpg".as_ref()).unwrap();
//! let normalized = PageNormalizer::new(NormalizeOptions::full()).normalize(&page);
//!
//! let segmenter = LineSegmenter::new(SegmentOptions::builder().overlay(true).build());
//! let output = segmenter.run(&normalized);
//! for line in &output.lines {
//!     println!("{} at {:?}", line.file_stem(), line.region);
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod filters;
pub mod layout;
pub mod normalize;
pub mod progress;
pub mod raster;
pub mod recognizer;
pub mod segment;

// Re-exports for convenience
pub use batch::{
    normalize_batch, segment_batch, BatchError, BatchReport, BatchRunner, NormalizeOutcome,
    PageError, PageOutcome, RegionManifest, SegmentOutcome,
};
pub use cli::{Cli, Commands, CommonArgs, NormalizeArgs, SegmentArgs};
pub use config::{CliOverrides, Config, ConfigError, RunSettings};
pub use layout::{PageId, PathResolver, RepositoryLayout, SourceVariant};
pub use normalize::{NormalizeOptions, NormalizeOptionsBuilder, NormalizeReport, PageNormalizer};
pub use progress::{BatchProgress, BatchStage, NoProgress, OutputMode, ProgressCallback};
pub use raster::RasterError;
pub use recognizer::{RecognizerError, TesseractRecognizer, TextRecognizer};
pub use segment::{
    LineArtifact, LineSegmenter, Region, SegmentOptions, SegmentOptionsBuilder, SegmentOutput,
};

/// Process exit codes
pub mod exit_codes {
    /// Every selected page succeeded
    pub const SUCCESS: i32 = 0;
    /// Nothing to process (no ids and no --all, or --all found nothing)
    pub const NO_TARGETS: i32 = 1;
    /// At least one page failed
    pub const PARTIAL_FAILURE: i32 = 2;
    /// Configuration or setup failure before any page ran
    pub const GENERAL_ERROR: i32 = 3;
}
