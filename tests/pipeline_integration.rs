//! Pipeline integration tests
//!
//! Runs both stages against a temporary repository tree on disk.

use image::{Rgb, RgbImage};
use manuscript_prep::batch::{MANIFEST_FILE, PREVIEW_FILE, CONTACT_SHEET_FILE};
use manuscript_prep::raster;
use manuscript_prep::{
    exit_codes, normalize_batch, segment_batch, BatchRunner, LineSegmenter, NoProgress,
    NormalizeOptions, PageId, PageNormalizer, PathResolver, RegionManifest, RepositoryLayout,
    SegmentOptions, SourceVariant,
};
use std::path::Path;

const PAPER: Rgb<u8> = Rgb([230, 230, 230]);
const INK: Rgb<u8> = Rgb([35, 35, 35]);

/// Neutral-gray page with full-width handwriting-like bands (3px strokes every 8px)
fn lined_page(width: u32, height: u32, band_tops: &[u32], band_height: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, PAPER);
    for &top in band_tops {
        for y in top..top + band_height {
            for x in (0..width).filter(|x| x % 8 < 3) {
                img.put_pixel(x, y, INK);
            }
        }
    }
    img
}

/// Five 40px bands on a 1000x1500 page, block-aligned for JPEG
fn five_band_page() -> RgbImage {
    let tops: Vec<u32> = (0..5).map(|i| 160 + i * 272).collect();
    lined_page(1000, 1500, &tops, 40)
}

fn page(id: &str) -> PageId {
    PageId::new(id).unwrap()
}

fn write_raw(layout: &RepositoryLayout, id: &PageId, img: &RgbImage) {
    raster::save_jpeg(img, &layout.page_path(id, SourceVariant::Raw), 95).unwrap();
}

fn list_lines(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("line_"))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    // End-to-end: five ruled bands yield five regions
    #[test]
    fn test_five_band_page_in_memory() {
        let output = LineSegmenter::default().run(&five_band_page());
        assert_eq!(output.regions.len(), 5);
        assert!(output.regions.iter().all(|r| r.x == 0));
        let ordinals: Vec<usize> = output.lines.iter().map(|l| l.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
    }

    // Crop safety: dominant contour under 70% keeps the original size
    #[test]
    fn test_crop_rejects_small_contour() {
        let mut img = RgbImage::from_pixel(400, 400, Rgb([20, 20, 20]));
        for y in 100..300 {
            for x in 100..300 {
                img.put_pixel(x, y, PAPER);
            }
        }
        let normalizer = PageNormalizer::new(NormalizeOptions::builder().crop(true).build());
        let (out, report) = normalizer.normalize_with_report(&img);
        assert_eq!(out.dimensions(), (400, 400));
        assert!(report.crop.is_none());
        assert_eq!(out, img);
    }

    #[test]
    fn test_normalize_then_segment() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let id = page("1839-04-05");
        write_raw(&layout, &id, &five_band_page());

        let runner = BatchRunner::new(Some(2));
        let normalizer =
            PageNormalizer::new(NormalizeOptions::builder().deskew(true).build());
        let outdir = layout.variant_dir(SourceVariant::NormalizedFull);
        let report = normalize_batch(
            &runner,
            &normalizer,
            &layout,
            std::slice::from_ref(&id),
            &outdir,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(report.exit_code(), exit_codes::SUCCESS);
        assert!(layout.page_path(&id, SourceVariant::NormalizedFull).is_file());
        assert!(!report.succeeded[0].report.rotated);

        let segmenter = LineSegmenter::new(
            SegmentOptions::builder().overlay(true).contact_sheet(true).build(),
        );
        let report = segment_batch(
            &runner,
            &segmenter,
            &layout,
            std::slice::from_ref(&id),
            SourceVariant::NormalizedFull,
            false,
            &NoProgress,
        )
        .unwrap();

        assert!(report.is_complete());
        let outcome = &report.succeeded[0];
        assert_eq!(outcome.source, SourceVariant::NormalizedFull);
        assert_eq!(outcome.lines, 5);
        assert_eq!(outcome.texts, 0);

        let lines_dir = layout.lines_dir(&id);
        assert_eq!(
            list_lines(&lines_dir),
            vec!["line_001.jpg", "line_002.jpg", "line_003.jpg", "line_004.jpg", "line_005.jpg"]
        );
        assert!(lines_dir.join(PREVIEW_FILE).is_file());
        assert!(lines_dir.join(CONTACT_SHEET_FILE).is_file());

        let manifest = RegionManifest::load(&lines_dir.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.page, id);
        assert_eq!((manifest.width, manifest.height), (1000, 1500));
        assert!(manifest
            .lines
            .windows(2)
            .all(|w| w[0].ordinal + 1 == w[1].ordinal && w[0].region.y < w[1].region.y));
    }

    #[test]
    fn test_segment_falls_back_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let id = page("1839-04-06");
        write_raw(&layout, &id, &five_band_page());

        let report = segment_batch(
            &BatchRunner::default(),
            &LineSegmenter::default(),
            &layout,
            std::slice::from_ref(&id),
            SourceVariant::NormalizedSafeCrop,
            false,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.succeeded[0].source, SourceVariant::Raw);
        assert_eq!(report.succeeded[0].lines, 5);
    }

    #[test]
    fn test_clean_replaces_stale_lines() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let id = page("1839-04-07");
        write_raw(&layout, &id, &lined_page(800, 1200, &[160, 480], 40));

        let lines_dir = layout.lines_dir(&id);
        std::fs::create_dir_all(&lines_dir).unwrap();
        std::fs::write(lines_dir.join("line_009.jpg"), b"stale").unwrap();

        let run = |clean| {
            segment_batch(
                &BatchRunner::default(),
                &LineSegmenter::default(),
                &layout,
                std::slice::from_ref(&id),
                SourceVariant::Raw,
                clean,
                &NoProgress,
            )
            .unwrap()
        };

        run(false);
        assert!(lines_dir.join("line_009.jpg").exists());
        assert!(lines_dir.join("line_002.jpg").exists());

        run(true);
        assert_eq!(list_lines(&lines_dir), vec!["line_001.jpg", "line_002.jpg"]);
    }

    #[test]
    fn test_failed_page_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let good = page("1839-04-05");
        let missing = page("1839-04-08");
        write_raw(&layout, &good, &lined_page(800, 1200, &[160], 40));

        let report = segment_batch(
            &BatchRunner::new(Some(2)),
            &LineSegmenter::default(),
            &layout,
            &[missing.clone(), good.clone()],
            SourceVariant::Raw,
            false,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].page, good);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].page, missing);
        assert_eq!(report.exit_code(), exit_codes::PARTIAL_FAILURE);
    }

    #[test]
    fn test_blank_page_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(dir.path());
        let id = page("1839-04-09");
        write_raw(&layout, &id, &RgbImage::from_pixel(600, 900, PAPER));

        let report = segment_batch(
            &BatchRunner::default(),
            &LineSegmenter::default(),
            &layout,
            std::slice::from_ref(&id),
            SourceVariant::Raw,
            false,
            &NoProgress,
        )
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded[0].lines, 0);
        let manifest = RegionManifest::load(&layout.lines_dir(&id).join(MANIFEST_FILE)).unwrap();
        assert!(manifest.lines.is_empty());
    }
}
