//! Configuration file support
//!
//! Settings come from a TOML file and are overridden by explicit CLI flags.
//! Lookup order: `--config <path>`, `./manuscript-prep.toml`,
//! `<config dir>/manuscript-prep/config.toml`, then built-in defaults.
//!
//! ```toml
//! threads = 4
//!
//! [normalize]
//! crop = true
//! crop_padding = 0.02
//! min_area_fraction = 0.7
//! deskew = true
//! contrast = true
//!
//! [segment]
//! preview = true
//! contact_sheet = true
//! recognize = false
//! recognizer_timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::normalize::NormalizeOptions;
use crate::recognizer::DEFAULT_TIMEOUT;
use crate::segment::{SegmentOptions, DEFAULT_COLUMNS, DEFAULT_THUMB_WIDTH};

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = "manuscript-prep.toml";

/// Directory under the user config dir
pub const APP_CONFIG_DIR: &str = "manuscript-prep";

/// Config error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `[segment]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSection {
    pub preview: bool,
    pub contact_sheet: bool,
    pub recognize: bool,
    pub recognizer_timeout_secs: u64,
    pub columns: usize,
    pub thumb_width: u32,
}

impl Default for SegmentSection {
    fn default() -> Self {
        Self {
            preview: false,
            contact_sheet: false,
            recognize: false,
            recognizer_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            columns: DEFAULT_COLUMNS,
            thumb_width: DEFAULT_THUMB_WIDTH,
        }
    }
}

/// File configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads (None = all cores)
    pub threads: Option<usize>,
    pub normalize: NormalizeOptions,
    pub segment: SegmentSection,
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub crop: Option<bool>,
    pub crop_padding: Option<f64>,
    pub min_area_fraction: Option<f64>,
    pub deskew: Option<bool>,
    pub contrast: Option<bool>,
    pub denoise: Option<bool>,
    pub sharpen: Option<bool>,
    pub preview: Option<bool>,
    pub contact_sheet: Option<bool>,
    pub recognize: Option<bool>,
    pub threads: Option<usize>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Effective settings for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub normalize: NormalizeOptions,
    pub segment: SegmentOptions,
    pub recognize: bool,
    pub recognizer_timeout: Duration,
    pub threads: Option<usize>,
}

impl Config {
    /// Candidate config file locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_CONFIG_DIR).join("config.toml"));
        }
        paths
    }

    /// Load from the first existing default location, or defaults
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load from an explicit file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge with CLI overrides (CLI wins when set)
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> RunSettings {
        let n = &self.normalize;
        let normalize = NormalizeOptions::builder()
            .crop(cli.crop.unwrap_or(n.crop))
            .crop_padding(cli.crop_padding.unwrap_or(n.crop_padding))
            .min_area_fraction(cli.min_area_fraction.unwrap_or(n.min_area_fraction))
            .deskew(cli.deskew.unwrap_or(n.deskew))
            .contrast(cli.contrast.unwrap_or(n.contrast))
            .denoise(cli.denoise.unwrap_or(n.denoise))
            .sharpen(cli.sharpen.unwrap_or(n.sharpen))
            .build();

        let s = &self.segment;
        let segment = SegmentOptions::builder()
            .overlay(cli.preview.unwrap_or(s.preview))
            .contact_sheet(cli.contact_sheet.unwrap_or(s.contact_sheet))
            .columns(s.columns)
            .thumb_width(s.thumb_width)
            .build();

        RunSettings {
            normalize,
            segment,
            recognize: cli.recognize.unwrap_or(s.recognize),
            recognizer_timeout: Duration::from_secs(s.recognizer_timeout_secs.max(1)),
            threads: cli.threads.or(self.threads).filter(|&t| t > 0),
        }
    }
}
