//! Deskew via Hough line angles
//!
//! # Algorithm
//!
//! 1. Canny edges over the grayscale page
//! 2. Standard Hough transform (1 px rho, 1 degree theta, 200 votes)
//! 3. Strongest 50 lines, each converted to a signed offset from horizontal
//!    and folded into [-45, +45] degrees
//! 4. Median of the offsets is the skew estimate
//! 5. Estimates under 0.3 degrees are treated as level; otherwise the page is
//!    rotated back about its centre with replicated borders

use image::{GrayImage, Rgb, RgbImage};
use imageproc::edges::canny;
use rayon::prelude::*;
use tracing::debug;

use super::crop::{CANNY_HIGH, CANNY_LOW};

// ============================================================
// Constants
// ============================================================

/// Minimum accumulator votes for a Hough line
pub const HOUGH_VOTE_THRESHOLD: u32 = 200;

/// At most this many lines contribute to the estimate
pub const MAX_LINES_FOR_ESTIMATE: usize = 50;

/// Estimates below this magnitude (degrees) leave the page untouched
pub const DESKEW_DEADBAND_DEGREES: f64 = 0.3;

/// Number of theta bins (1 degree each over [0, 180))
const THETA_BINS: usize = 180;

// ============================================================
// Hough transform
// ============================================================

/// A detected line in normal form `x*cos(theta) + y*sin(theta) = rho`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    /// Signed distance from the origin in pixels
    pub rho: f64,
    /// Angle of the line normal in whole degrees, [0, 180)
    pub theta_degrees: u32,
    /// Accumulator votes
    pub votes: u32,
}

impl HoughLine {
    /// Signed angle of the line itself relative to horizontal, folded into
    /// [-45, +45] degrees. Positive means the line descends to the right.
    pub fn skew_degrees(&self) -> f64 {
        let mut angle = self.theta_degrees as f64 - 90.0;
        if angle > 45.0 {
            angle -= 90.0;
        }
        if angle < -45.0 {
            angle += 90.0;
        }
        angle
    }
}

/// Standard Hough transform over all non-zero pixels of `edges`
///
/// Lines are accumulator local maxima above `vote_threshold`, sorted by votes
/// descending (ties keep accumulator order).
pub fn hough_lines(edges: &GrayImage, vote_threshold: u32) -> Vec<HoughLine> {
    let (width, height) = edges.dimensions();
    let num_rho = 2 * (width as usize + height as usize) + 1;
    let rho_offset = (num_rho - 1) / 2;

    let points: Vec<(f64, f64)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x as f64, y as f64))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }

    let mut accumulator = vec![0u32; THETA_BINS * num_rho];
    accumulator
        .par_chunks_mut(num_rho)
        .enumerate()
        .for_each(|(n, row)| {
            let theta = (n as f64).to_radians();
            let (sin, cos) = theta.sin_cos();
            for &(x, y) in &points {
                let r = (x * cos + y * sin).round() as i64 + rho_offset as i64;
                if r >= 0 && (r as usize) < num_rho {
                    row[r as usize] += 1;
                }
            }
        });

    let at = |n: i64, r: i64| -> u32 {
        if n < 0 || r < 0 || n >= THETA_BINS as i64 || r >= num_rho as i64 {
            0
        } else {
            accumulator[n as usize * num_rho + r as usize]
        }
    };

    let mut candidates: Vec<(usize, u32)> = Vec::new();
    for n in 0..THETA_BINS as i64 {
        for r in 0..num_rho as i64 {
            let base = at(n, r);
            if base > vote_threshold
                && base > at(n, r - 1)
                && base >= at(n, r + 1)
                && base > at(n - 1, r)
                && base >= at(n + 1, r)
            {
                candidates.push((n as usize * num_rho + r as usize, base));
            }
        }
    }
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    candidates
        .into_iter()
        .map(|(idx, votes)| HoughLine {
            rho: (idx % num_rho) as f64 - rho_offset as f64,
            theta_degrees: (idx / num_rho) as u32,
            votes,
        })
        .collect()
}

// ============================================================
// Estimation
// ============================================================

/// Median, averaging the middle pair for even lengths
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Estimate page skew in degrees; 0.0 when no line is detected
pub fn estimate_skew_angle(gray: &GrayImage) -> f64 {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let lines = hough_lines(&edges, HOUGH_VOTE_THRESHOLD);

    let mut angles: Vec<f64> = lines
        .iter()
        .take(MAX_LINES_FOR_ESTIMATE)
        .map(HoughLine::skew_degrees)
        .collect();

    let estimate = median(&mut angles).unwrap_or(0.0);
    debug!(lines = lines.len(), estimate, "Skew estimated");
    estimate
}

// ============================================================
// Rotation
// ============================================================

/// Rotate `image` counter-clockwise by `angle_degrees` about `(w/2, h/2)`
///
/// Output keeps the input dimensions. Samples are bilinear; coordinates that
/// fall outside the source are clamped to the nearest edge pixel.
pub fn rotate_replicate(image: &RgbImage, angle_degrees: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let cx = (width / 2) as f64;
    let cy = (height / 2) as f64;
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let max_x = (width - 1) as i64;
    let max_y = (height - 1) as i64;
    let row_len = width as usize * 3;

    let sample = |x: i64, y: i64| -> [u8; 3] {
        image
            .get_pixel(x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32)
            .0
    };

    let mut buffer = vec![0u8; row_len * height as usize];
    buffer
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f64 - cy;
            for x in 0..width as usize {
                let dx = x as f64 - cx;
                let sx = cos * dx - sin * dy + cx;
                let sy = sin * dx + cos * dy + cy;

                let x0 = sx.floor();
                let y0 = sy.floor();
                let fx = sx - x0;
                let fy = sy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);

                let p00 = sample(x0, y0);
                let p10 = sample(x0 + 1, y0);
                let p01 = sample(x0, y0 + 1);
                let p11 = sample(x0 + 1, y0 + 1);

                for c in 0..3 {
                    let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
                    let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
                    let v = top * (1.0 - fy) + bottom * fy;
                    row[x * 3 + c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    RgbImage::from_raw(width, height, buffer)
        .unwrap_or_else(|| RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
}

/// Result of the deskew stage
#[derive(Debug, Clone)]
pub struct DeskewOutcome {
    /// Estimated skew in degrees
    pub angle: f64,
    /// Rotated page, or None when the estimate fell inside the deadband
    pub image: Option<RgbImage>,
}

/// Estimate skew and rotate the page level when needed
pub fn deskew(image: &RgbImage) -> DeskewOutcome {
    let gray = image::DynamicImage::ImageRgb8(image.clone()).to_luma8();
    let angle = estimate_skew_angle(&gray);

    if angle.abs() < DESKEW_DEADBAND_DEGREES {
        debug!(angle, "Page already level");
        return DeskewOutcome { angle, image: None };
    }

    DeskewOutcome {
        angle,
        image: Some(rotate_replicate(image, angle)),
    }
}
