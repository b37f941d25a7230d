//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::layout::SourceVariant;

/// Manuscript page normalization and line segmentation
#[derive(Debug, Parser)]
#[command(name = "manuscript-prep", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Crop, deskew and clean up raw page photographs
    Normalize(NormalizeArgs),
    /// Split pages into line crops for transcription
    Segment(SegmentArgs),
    /// Show system and tool information
    Info,
}

/// Options shared by every batch command
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Page ids (YYYY-MM-DD) to process
    pub ids: Vec<String>,

    /// Process every page found in the source directory
    #[arg(long)]
    pub all: bool,

    /// Repository root containing images/
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Worker threads (default: all cores)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Config file (default: ./manuscript-prep.toml, then user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress and summary output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Args)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Output directory (default: images/processed_full)
    #[arg(long)]
    pub outdir: Option<PathBuf>,

    /// Auto-crop to the page boundary
    #[arg(long)]
    pub crop: bool,

    /// Padding fraction around the detected crop
    #[arg(long, value_name = "FRACTION")]
    pub crop_pad: Option<f64>,

    /// Minimum crop area relative to the original
    #[arg(long, value_name = "FRACTION")]
    pub min_area: Option<f64>,

    /// Estimate and correct rotation
    #[arg(long)]
    pub deskew: bool,

    /// Local contrast enhancement (CLAHE) on luminance
    #[arg(long)]
    pub clahe: bool,

    /// Non-local means denoise
    #[arg(long)]
    pub denoise: bool,

    /// Sharpen after denoise
    #[arg(long)]
    pub sharpen: bool,
}

impl NormalizeArgs {
    /// Only flags given on the command line override the config file
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            crop: self.crop.then_some(true),
            crop_padding: self.crop_pad,
            min_area_fraction: self.min_area,
            deskew: self.deskew.then_some(true),
            contrast: self.clahe.then_some(true),
            denoise: self.denoise.then_some(true),
            sharpen: self.sharpen.then_some(true),
            threads: self.common.threads,
            ..CliOverrides::new()
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SegmentArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Which page raster to segment
    #[arg(long, value_enum, default_value_t = SourceVariant::NormalizedFull)]
    pub source: SourceVariant,

    /// Attempt advisory OCR per line (requires tesseract)
    #[arg(long)]
    pub ocr: bool,

    /// Replace existing line crops instead of overwriting in place
    #[arg(long)]
    pub clean: bool,

    /// Write _preview.jpg with detected line boxes
    #[arg(long)]
    pub preview: bool,

    /// Write _contact_sheet.jpg tiling all line crops
    #[arg(long)]
    pub contact_sheet: bool,
}

impl SegmentArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            preview: self.preview.then_some(true),
            contact_sheet: self.contact_sheet.then_some(true),
            recognize: self.ocr.then_some(true),
            threads: self.common.threads,
            ..CliOverrides::new()
        }
    }
}
