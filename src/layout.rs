//! Repository layout and page sources
//!
//! Page artifacts are keyed by a caller-supplied page identifier (normally a
//! `YYYY-MM-DD` date). Path conventions live behind [`PathResolver`] so the
//! image pipeline never hardcodes storage layout.

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of page rasters on disk
pub const PAGE_EXTENSION: &str = "jpg";

// ============================================================
// Page identity
// ============================================================

/// Caller-supplied page key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Wrap a key; blank keys or keys containing path separators are rejected
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == ".." || trimmed == "." {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Calendar date when the key is `YYYY-MM-DD`
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y-%m-%d").ok()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for PageId {
    /// Dated pages chronologically, then everything else lexicographically
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.date(), other.date()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for PageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================
// Source variants
// ============================================================

/// Which raster of a page feeds segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
pub enum SourceVariant {
    /// Every normalization stage applied
    #[default]
    #[value(name = "processed_full")]
    #[serde(rename = "processed_full")]
    NormalizedFull,
    /// Normalized without auto-crop
    #[value(name = "processed_safe")]
    #[serde(rename = "processed_safe")]
    NormalizedSafeCrop,
    /// The untouched photograph
    #[value(name = "original")]
    #[serde(rename = "original")]
    Raw,
}

impl fmt::Display for SourceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceVariant::NormalizedFull => "processed_full",
            SourceVariant::NormalizedSafeCrop => "processed_safe",
            SourceVariant::Raw => "original",
        };
        f.write_str(name)
    }
}

// ============================================================
// Path resolution
// ============================================================

/// Maps page identity to artifact locations
pub trait PathResolver: Send + Sync {
    /// Raster location for a page variant (may not exist)
    fn page_path(&self, page: &PageId, variant: SourceVariant) -> PathBuf;

    /// Directory that receives a page's line artifacts
    fn lines_dir(&self, page: &PageId) -> PathBuf;

    /// Directory that holds every page of a variant
    fn variant_dir(&self, variant: SourceVariant) -> PathBuf;

    /// Existing raster to segment: the requested variant, else the raw page
    fn resolve_source(&self, page: &PageId, variant: SourceVariant) -> Option<(PathBuf, SourceVariant)> {
        let requested = self.page_path(page, variant);
        if requested.is_file() {
            return Some((requested, variant));
        }
        let raw = self.page_path(page, SourceVariant::Raw);
        raw.is_file().then_some((raw, SourceVariant::Raw))
    }

    /// Page ids with a raster in the variant directory, dated pages first
    fn discover(&self, variant: SourceVariant) -> std::io::Result<Vec<PageId>> {
        let dir = self.variant_dir(variant);
        let mut pages = Vec::new();
        if !dir.is_dir() {
            return Ok(pages);
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() || !has_page_extension(&path) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(PageId::new) {
                pages.push(id);
            }
        }
        pages.sort();
        Ok(pages)
    }
}

fn has_page_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == PAGE_EXTENSION)
}

/// `images/` tree of a transcription repository
///
/// ```text
/// images/<id>.jpg
/// images/processed_full/<id>.jpg
/// images/processed_safe_crop/<id>.jpg
/// images/lines/<id>/line_001.jpg
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    root: PathBuf,
}

impl RepositoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }
}

impl Default for RepositoryLayout {
    fn default() -> Self {
        Self::new(".")
    }
}

impl PathResolver for RepositoryLayout {
    fn page_path(&self, page: &PageId, variant: SourceVariant) -> PathBuf {
        self.variant_dir(variant)
            .join(format!("{}.{}", page, PAGE_EXTENSION))
    }

    fn lines_dir(&self, page: &PageId) -> PathBuf {
        self.images_dir().join("lines").join(page.as_str())
    }

    fn variant_dir(&self, variant: SourceVariant) -> PathBuf {
        let images = self.images_dir();
        match variant {
            SourceVariant::NormalizedFull => images.join("processed_full"),
            SourceVariant::NormalizedSafeCrop => images.join("processed_safe_crop"),
            SourceVariant::Raw => images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PageId {
        PageId::new(s).unwrap()
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_page_id_validation() {
        assert!(PageId::new("").is_none());
        assert!(PageId::new("   ").is_none());
        assert!(PageId::new("../etc").is_none());
        assert!(PageId::new("..").is_none());
        assert_eq!(id(" 1839-04-05 ").as_str(), "1839-04-05");
    }

    #[test]
    fn test_page_id_date() {
        assert_eq!(
            id("1839-04-05").date(),
            NaiveDate::from_ymd_opt(1839, 4, 5)
        );
        assert!(id("cover").date().is_none());
        assert!(id("1839-13-40").date().is_none());
    }

    #[test]
    fn test_page_id_ordering() {
        let mut pages = vec![id("cover"), id("1840-01-02"), id("1839-12-31"), id("appendix")];
        pages.sort();
        let names: Vec<&str> = pages.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["1839-12-31", "1840-01-02", "appendix", "cover"]);
    }

    #[test]
    fn test_layout_paths() {
        let layout = RepositoryLayout::new("/repo");
        let page = id("1839-04-05");
        assert_eq!(
            layout.page_path(&page, SourceVariant::Raw),
            PathBuf::from("/repo/images/1839-04-05.jpg")
        );
        assert_eq!(
            layout.page_path(&page, SourceVariant::NormalizedFull),
            PathBuf::from("/repo/images/processed_full/1839-04-05.jpg")
        );
        assert_eq!(
            layout.page_path(&page, SourceVariant::NormalizedSafeCrop),
            PathBuf::from("/repo/images/processed_safe_crop/1839-04-05.jpg")
        );
        assert_eq!(
            layout.lines_dir(&page),
            PathBuf::from("/repo/images/lines/1839-04-05")
        );
    }

    #[test]
    fn test_resolve_source_falls_back_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let page = id("1839-04-05");

        assert!(layout.resolve_source(&page, SourceVariant::NormalizedFull).is_none());

        touch(&layout.page_path(&page, SourceVariant::Raw));
        let (path, used) = layout
            .resolve_source(&page, SourceVariant::NormalizedFull)
            .unwrap();
        assert_eq!(used, SourceVariant::Raw);
        assert_eq!(path, layout.page_path(&page, SourceVariant::Raw));

        touch(&layout.page_path(&page, SourceVariant::NormalizedFull));
        let (_, used) = layout
            .resolve_source(&page, SourceVariant::NormalizedFull)
            .unwrap();
        assert_eq!(used, SourceVariant::NormalizedFull);
    }

    #[test]
    fn test_discover_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let images = layout.images_dir();
        touch(&images.join("1839-04-06.jpg"));
        touch(&images.join("1839-04-05.jpg"));
        touch(&images.join("1839-04-07.png"));
        touch(&images.join("notes.txt"));
        touch(&images.join("processed_full").join("1839-04-05.jpg"));

        let raw = layout.discover(SourceVariant::Raw).unwrap();
        let names: Vec<&str> = raw.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["1839-04-05", "1839-04-06"]);

        let full = layout.discover(SourceVariant::NormalizedFull).unwrap();
        assert_eq!(full.len(), 1);
        assert!(layout.discover(SourceVariant::NormalizedSafeCrop).unwrap().is_empty());
    }

    #[test]
    fn test_source_variant_names() {
        assert_eq!(SourceVariant::NormalizedSafeCrop.to_string(), "processed_safe");
        assert_eq!(
            SourceVariant::from_str("original", false).unwrap(),
            SourceVariant::Raw
        );
        assert_eq!(SourceVariant::default(), SourceVariant::NormalizedFull);
    }
}
