//! Batch processing
//!
//! Pages are independent units of work: each job reads one source raster,
//! writes only to paths keyed by its own page id, and reports a
//! per-page result. Failures are collected, never short-circuit the batch.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::exit_codes;
use crate::layout::{PageId, PathResolver, SourceVariant, PAGE_EXTENSION};
use crate::normalize::{NormalizeReport, PageNormalizer};
use crate::progress::ProgressCallback;
use crate::raster::{self, RasterError, ARCHIVAL_JPEG_QUALITY, PREVIEW_JPEG_QUALITY};
use crate::segment::{LineSegmenter, Region, SegmentOutput};

/// Overlay file name inside a lines directory
pub const PREVIEW_FILE: &str = "_preview.jpg";

/// Contact sheet file name inside a lines directory
pub const CONTACT_SHEET_FILE: &str = "_contact_sheet.jpg";

/// Region manifest file name inside a lines directory
pub const MANIFEST_FILE: &str = "_regions.json";

// ============================================================
// Errors
// ============================================================

/// Batch error types
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No source image for page {0}")]
    SourceMissing(PageId),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error("Failed to write region manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;

/// A failed page and why
#[derive(Debug, Error)]
#[error("{page}: {source}")]
pub struct PageError {
    pub page: PageId,
    pub source: BatchError,
}

// ============================================================
// Outcomes
// ============================================================

/// Common view of a successful page
pub trait PageOutcome {
    fn page(&self) -> &PageId;

    /// Artifacts written (pages or line crops)
    fn artifacts(&self) -> usize;
}

/// One normalized page
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub page: PageId,
    pub output: PathBuf,
    pub report: NormalizeReport,
}

impl PageOutcome for NormalizeOutcome {
    fn page(&self) -> &PageId {
        &self.page
    }

    fn artifacts(&self) -> usize {
        1
    }
}

/// One segmented page
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub page: PageId,
    /// Variant actually read (may be the raw fallback)
    pub source: SourceVariant,
    pub lines_dir: PathBuf,
    pub lines: usize,
    /// Lines that received advisory text
    pub texts: usize,
}

impl PageOutcome for SegmentOutcome {
    fn page(&self) -> &PageId {
        &self.page
    }

    fn artifacts(&self) -> usize {
        self.lines
    }
}

/// Aggregated result of a batch, in input order
#[derive(Debug)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<PageError>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T: PageOutcome> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn artifacts(&self) -> usize {
        self.succeeded.iter().map(|o| o.artifacts()).sum()
    }

    /// Process exit code: success, or partial failure when any page failed
    pub fn exit_code(&self) -> i32 {
        if self.is_complete() {
            exit_codes::SUCCESS
        } else {
            exit_codes::PARTIAL_FAILURE
        }
    }
}

// ============================================================
// Runner
// ============================================================

/// Runs page jobs in parallel
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchRunner {
    threads: Option<usize>,
}

impl BatchRunner {
    /// `None` uses the global rayon pool (one worker per core)
    pub fn new(threads: Option<usize>) -> Self {
        Self {
            threads: threads.filter(|&t| t > 0),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    /// Run `job` for every page, collecting successes and failures
    pub fn run<T, F>(
        &self,
        pages: &[PageId],
        progress: &dyn ProgressCallback,
        job: F,
    ) -> Result<BatchReport<T>>
    where
        T: Send + PageOutcome,
        F: Fn(&PageId) -> Result<T> + Sync,
    {
        let work = || -> Vec<std::result::Result<T, PageError>> {
            pages
                .par_iter()
                .map(|page| {
                    progress.on_page_start(page);
                    match job(page) {
                        Ok(outcome) => {
                            progress.on_page_complete(page, outcome.artifacts());
                            Ok(outcome)
                        }
                        Err(source) => {
                            error!(%page, "Page failed: {}", source);
                            progress.on_page_failed(page, &source.to_string());
                            Err(PageError {
                                page: page.clone(),
                                source,
                            })
                        }
                    }
                })
                .collect()
        };

        let results = match self.threads {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| BatchError::ThreadPool(e.to_string()))?
                .install(work),
            None => work(),
        };

        let mut report = BatchReport::default();
        for result in results {
            match result {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(e) => report.failed.push(e),
            }
        }
        Ok(report)
    }
}

// ============================================================
// Normalize jobs
// ============================================================

/// Normalize one raw page into `outdir/<id>.jpg`
#[instrument(skip_all, fields(page = %page))]
pub fn normalize_page(
    normalizer: &PageNormalizer,
    resolver: &dyn PathResolver,
    page: &PageId,
    outdir: &Path,
) -> Result<NormalizeOutcome> {
    let input = resolver.page_path(page, SourceVariant::Raw);
    let output = outdir.join(format!("{}.{}", page, PAGE_EXTENSION));
    let report = normalizer.normalize_file(&input, &output)?;
    Ok(NormalizeOutcome {
        page: page.clone(),
        output,
        report,
    })
}

/// Normalize every page in parallel
pub fn normalize_batch(
    runner: &BatchRunner,
    normalizer: &PageNormalizer,
    resolver: &dyn PathResolver,
    pages: &[PageId],
    outdir: &Path,
    progress: &dyn ProgressCallback,
) -> Result<BatchReport<NormalizeOutcome>> {
    let report = runner.run(pages, progress, |page| {
        normalize_page(normalizer, resolver, page, outdir)
    })?;
    info!(
        ok = report.succeeded.len(),
        failed = report.failed.len(),
        outdir = %outdir.display(),
        "Normalization batch finished"
    );
    Ok(report)
}

// ============================================================
// Segment jobs
// ============================================================

/// One line entry of the region manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub ordinal: usize,
    #[serde(flatten)]
    pub region: Region,
    pub image_file: String,
    pub text_file: Option<String>,
}

/// `_regions.json`: line positions on the segmented source raster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionManifest {
    pub page: PageId,
    pub source: SourceVariant,
    pub width: u32,
    pub height: u32,
    pub lines: Vec<LineRecord>,
}

impl RegionManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write every artifact of a segmented page into `dir`
///
/// Returns the manifest that was written alongside the images.
pub fn write_line_artifacts(
    output: &SegmentOutput,
    page: &PageId,
    source: SourceVariant,
    page_size: (u32, u32),
    dir: &Path,
) -> Result<RegionManifest> {
    std::fs::create_dir_all(dir)?;

    if let Some(overlay) = &output.overlay {
        raster::save_jpeg(overlay, &dir.join(PREVIEW_FILE), PREVIEW_JPEG_QUALITY)?;
    }

    let mut records = Vec::with_capacity(output.lines.len());
    for line in &output.lines {
        let stem = line.file_stem();
        let image_file = format!("{}.jpg", stem);
        raster::save_jpeg(&line.image, &dir.join(&image_file), ARCHIVAL_JPEG_QUALITY)?;

        let text_file = match line.text.as_deref() {
            Some(text) if !text.is_empty() => {
                let name = format!("{}.txt", stem);
                std::fs::write(dir.join(&name), format!("{}\n", text))?;
                Some(name)
            }
            _ => None,
        };

        records.push(LineRecord {
            ordinal: line.ordinal,
            region: line.region,
            image_file,
            text_file,
        });
    }

    if let Some(sheet) = &output.contact_sheet {
        raster::save_jpeg(sheet, &dir.join(CONTACT_SHEET_FILE), PREVIEW_JPEG_QUALITY)?;
    }

    let manifest = RegionManifest {
        page: page.clone(),
        source,
        width: page_size.0,
        height: page_size.1,
        lines: records,
    };
    std::fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(manifest)
}

/// Build a directory's new contents in a sibling staging directory, then
/// swap it into place
///
/// The previous directory is moved aside before the staged one is renamed
/// in, so a reader sees either the old complete set or the new one. If the
/// final rename fails the previous directory is moved back.
pub fn replace_dir<T>(target: &Path, fill: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lines".to_string());
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}.staging-", name))
        .tempdir_in(parent)?;

    // Dropping the TempDir on error removes the partial staging tree
    let value = fill(staging.path())?;

    let retired = if target.exists() {
        let trash = tempfile::Builder::new()
            .prefix(&format!(".{}.old-", name))
            .tempdir_in(parent)?;
        let trash_path = trash.path().join(&name);
        std::fs::rename(target, &trash_path)?;
        Some(trash)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging.path(), target) {
        if let Some(trash) = &retired {
            if let Err(restore) = std::fs::rename(trash.path().join(&name), target) {
                error!(
                    target = %target.display(),
                    "Could not restore previous directory: {}", restore
                );
            }
        }
        return Err(e.into());
    }
    let _ = staging.keep();
    drop(retired);

    debug!(target = %target.display(), "Directory replaced");
    Ok(value)
}

/// Segment one page into its lines directory
#[instrument(skip_all, fields(page = %page, source = %source))]
pub fn segment_page(
    segmenter: &LineSegmenter,
    resolver: &dyn PathResolver,
    page: &PageId,
    source: SourceVariant,
    clean: bool,
) -> Result<SegmentOutcome> {
    let (path, used) = resolver
        .resolve_source(page, source)
        .ok_or_else(|| BatchError::SourceMissing(page.clone()))?;
    if used != source {
        debug!(requested = %source, "Falling back to the raw page");
    }

    let raster = raster::load(&path)?;
    let output = segmenter.run(&raster);
    let lines_dir = resolver.lines_dir(page);

    let write = |dir: &Path| write_line_artifacts(&output, page, used, raster.dimensions(), dir);
    let manifest = if clean {
        replace_dir(&lines_dir, write)?
    } else {
        write(&lines_dir)?
    };

    let texts = manifest.lines.iter().filter(|l| l.text_file.is_some()).count();
    info!(
        lines = manifest.lines.len(),
        texts,
        dir = %lines_dir.display(),
        "Saved line crops"
    );

    Ok(SegmentOutcome {
        page: page.clone(),
        source: used,
        lines_dir,
        lines: manifest.lines.len(),
        texts,
    })
}

/// Segment every page in parallel
pub fn segment_batch(
    runner: &BatchRunner,
    segmenter: &LineSegmenter,
    resolver: &dyn PathResolver,
    pages: &[PageId],
    source: SourceVariant,
    clean: bool,
    progress: &dyn ProgressCallback,
) -> Result<BatchReport<SegmentOutcome>> {
    let report = runner.run(pages, progress, |page| {
        segment_page(segmenter, resolver, page, source, clean)
    })?;
    info!(
        ok = report.succeeded.len(),
        failed = report.failed.len(),
        lines = report.artifacts(),
        "Segmentation batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RepositoryLayout;
    use crate::progress::NoProgress;
    use crate::segment::LineArtifact;
    use image::{Rgb, RgbImage};

    fn page(s: &str) -> PageId {
        PageId::new(s).unwrap()
    }

    fn output_with_lines(n: usize) -> SegmentOutput {
        let lines: Vec<LineArtifact> = (1..=n)
            .map(|i| LineArtifact {
                ordinal: i,
                region: Region::new(10, 40 * i as u32, 200, 30),
                image: RgbImage::from_pixel(200, 30, Rgb([128, 128, 128])),
                text: (i == 1).then(|| "Dear Sister".to_string()),
            })
            .collect();
        SegmentOutput {
            regions: lines.iter().map(|l| l.region).collect(),
            lines,
            overlay: Some(RgbImage::new(300, 400)),
            contact_sheet: None,
        }
    }

    struct Counted(usize);

    impl PageOutcome for Counted {
        fn page(&self) -> &PageId {
            unreachable!()
        }
        fn artifacts(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_write_line_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let lines_dir = dir.path().join("1839-04-05");
        let manifest = write_line_artifacts(
            &output_with_lines(3),
            &page("1839-04-05"),
            SourceVariant::NormalizedFull,
            (300, 400),
            &lines_dir,
        )
        .unwrap();

        assert!(lines_dir.join("line_001.jpg").exists());
        assert!(lines_dir.join("line_003.jpg").exists());
        assert!(lines_dir.join(PREVIEW_FILE).exists());
        assert!(!lines_dir.join(CONTACT_SHEET_FILE).exists());
        assert_eq!(
            std::fs::read_to_string(lines_dir.join("line_001.txt")).unwrap(),
            "Dear Sister\n"
        );
        assert!(!lines_dir.join("line_002.txt").exists());

        let loaded = RegionManifest::load(&lines_dir.join(MANIFEST_FILE)).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.lines[1].region, Region::new(10, 80, 200, 30));
        assert_eq!(loaded.lines[0].text_file.as_deref(), Some("line_001.txt"));
    }

    #[test]
    fn test_manifest_is_flat_json() {
        let record = LineRecord {
            ordinal: 2,
            region: Region::new(1, 2, 3, 4),
            image_file: "line_002.jpg".into(),
            text_file: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["x"], 1);
        assert_eq!(value["height"], 4);
        assert!(value["text_file"].is_null());
    }

    #[test]
    fn test_replace_dir_swaps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lines").join("1839-04-05");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("line_009.jpg"), b"stale").unwrap();

        let written = replace_dir(&target, |staging| {
            std::fs::write(staging.join("line_001.jpg"), b"fresh")?;
            Ok(1usize)
        })
        .unwrap();

        assert_eq!(written, 1);
        assert!(target.join("line_001.jpg").exists());
        assert!(!target.join("line_009.jpg").exists());

        // No staging or retired directories left behind
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_replace_dir_failure_keeps_old() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("1839-04-05");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("line_001.jpg"), b"old").unwrap();

        let result: Result<()> = replace_dir(&target, |_| {
            Err(BatchError::SourceMissing(page("1839-04-05")))
        });

        assert!(result.is_err());
        assert!(target.join("line_001.jpg").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_replace_dir_restores_old_when_swap_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("1839-04-05");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("line_001.jpg"), b"old").unwrap();

        // Removing the staging directory makes the final rename fail
        let result = replace_dir(&target, |staging| {
            std::fs::remove_dir(staging)?;
            Ok(())
        });

        assert!(matches!(result, Err(BatchError::IoError(_))));
        assert_eq!(std::fs::read(target.join("line_001.jpg")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_runner_collects_failures() {
        let pages = vec![page("1839-01-01"), page("1839-01-02"), page("1839-01-03")];
        let runner = BatchRunner::new(Some(2));
        let report = runner
            .run(&pages, &NoProgress, |p| {
                if p.as_str().ends_with('2') {
                    Err(BatchError::SourceMissing(p.clone()))
                } else {
                    Ok(Counted(4))
                }
            })
            .unwrap();

        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed[0].page, page("1839-01-02"));
        assert_eq!(report.artifacts(), 8);
        assert_eq!(report.exit_code(), exit_codes::PARTIAL_FAILURE);
    }

    #[test]
    fn test_runner_zero_threads_uses_default_pool() {
        let runner = BatchRunner::new(Some(0));
        assert_eq!(runner.threads(), num_cpus::get());
        let report = runner
            .run(&[page("a")], &NoProgress, |_| Ok(Counted(0)))
            .unwrap();
        assert_eq!(report.exit_code(), exit_codes::SUCCESS);
    }

    #[test]
    fn test_segment_page_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let err = segment_page(
            &LineSegmenter::default(),
            &layout,
            &page("1839-04-05"),
            SourceVariant::NormalizedFull,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::SourceMissing(_)));
    }

    #[test]
    fn test_segment_page_undecodable_source() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let p = page("1839-04-05");
        let path = layout.page_path(&p, SourceVariant::Raw);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not a jpeg").unwrap();

        let err = segment_page(&LineSegmenter::default(), &layout, &p, SourceVariant::Raw, false)
            .unwrap_err();
        assert!(matches!(err, BatchError::Raster(ref e) if e.is_read_error()));
    }

    #[test]
    fn test_normalize_page_writes_to_outdir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let p = page("1839-04-05");
        raster::save_jpeg(
            &RgbImage::from_pixel(64, 48, Rgb([200, 190, 180])),
            &layout.page_path(&p, SourceVariant::Raw),
            95,
        )
        .unwrap();

        let outdir = layout.variant_dir(SourceVariant::NormalizedFull);
        let outcome = normalize_page(&PageNormalizer::default(), &layout, &p, &outdir).unwrap();
        assert_eq!(outcome.output, outdir.join("1839-04-05.jpg"));
        assert!(outcome.output.exists());
        assert_eq!(outcome.report.output_size, (64, 48));
    }
}
