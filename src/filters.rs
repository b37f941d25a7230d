//! Numeric image primitives shared by the normalizer and the segmenter
//!
//! All filters use replicated borders unless noted otherwise.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, Contour};
use rayon::prelude::*;

// ============================================================
// Gaussian
// ============================================================

/// Gaussian sigma OpenCV derives for a given odd kernel size when sigma is 0
pub fn sigma_for_kernel_size(size: usize) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Generate a normalized 1D Gaussian kernel
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as i32;
    let mut kernel = Vec::with_capacity(size);
    let mut sum = 0.0f32;

    for i in 0..size {
        let x = (i as i32 - half) as f32;
        let g = (-x * x / (2.0 * sigma * sigma)).exp();
        kernel.push(g);
        sum += g;
    }

    for k in &mut kernel {
        *k /= sum;
    }

    kernel
}

/// Separable 2D convolution over a single-channel float plane
pub fn convolve_separable(data: &[f32], width: u32, height: u32, kernel: &[f32]) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let k_half = (kernel.len() / 2) as i64;

    // Horizontal pass
    let mut temp = vec![0.0f32; w * h];
    temp.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as i64 + ki as i64 - k_half).clamp(0, w as i64 - 1) as usize;
                sum += data[y * w + sx] * kv;
            }
            *out = sum;
        }
    });

    // Vertical pass
    let mut result = vec![0.0f32; w * h];
    result.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as i64 + ki as i64 - k_half).clamp(0, h as i64 - 1) as usize;
                sum += temp[sy * w + x] * kv;
            }
            *out = sum;
        }
    });

    result
}

// ============================================================
// Thresholding
// ============================================================

/// Locally adaptive, inverted binarization
///
/// The threshold for every pixel is the Gaussian-weighted mean of its
/// `block_size` neighbourhood minus `c`. Pixels brighter than their threshold
/// become 0, the rest 255, so dark ink ends up as foreground.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: usize, c: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }

    let plane: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32).collect();
    let kernel = gaussian_kernel(block_size, sigma_for_kernel_size(block_size));
    let means = convolve_separable(&plane, width, height, &kernel);

    let mut out = GrayImage::new(width, height);
    for (i, pixel) in out.pixels_mut().enumerate() {
        let threshold = means[i].round() - c;
        *pixel = if plane[i] > threshold {
            Luma([0])
        } else {
            Luma([255])
        };
    }
    out
}

// ============================================================
// Morphology
// ============================================================

/// Dilate a binary/grayscale mask with a `kernel_w` x `kernel_h` rectangle
/// anchored at its centre.
///
/// A rectangular max filter is separable, so this runs as a horizontal max
/// pass followed by a vertical one.
pub fn dilate_rect(mask: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
    let (width, height) = mask.dimensions();
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || kernel_w == 0 || kernel_h == 0 {
        return mask.clone();
    }

    let anchor_x = (kernel_w / 2) as i64;
    let anchor_y = (kernel_h / 2) as i64;
    let src = mask.as_raw();

    let mut temp = vec![0u8; w * h];
    temp.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let lo = (x as i64 - anchor_x).max(0) as usize;
            let hi = ((x as i64 - anchor_x + kernel_w as i64 - 1).min(w as i64 - 1)) as usize;
            *out = src[y * w + lo..=y * w + hi].iter().copied().max().unwrap_or(0);
        }
    });

    let mut result = vec![0u8; w * h];
    result.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let lo = (y as i64 - anchor_y).max(0) as usize;
        let hi = ((y as i64 - anchor_y + kernel_h as i64 - 1).min(h as i64 - 1)) as usize;
        for (x, out) in row.iter_mut().enumerate() {
            *out = (lo..=hi).map(|sy| temp[sy * w + x]).max().unwrap_or(0);
        }
    });

    GrayImage::from_raw(width, height, result).unwrap_or_else(|| mask.clone())
}

// ============================================================
// Convolution
// ============================================================

/// Reflect-101 index (`gfedcb|abcdefgh|gfedcba`)
pub(crate) fn reflect_101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * (len - 1) - i;
        }
    }
    i as usize
}

/// Convolve each channel of an RGB raster with a 3x3 kernel (reflect-101
/// border), clamping the result to 0..=255.
pub fn convolve3x3(image: &RgbImage, kernel: &[[f32; 3]; 3]) -> RgbImage {
    let (width, height) = image.dimensions();
    let w = width as i64;
    let h = height as i64;

    let mut out = RgbImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (ky, row) in kernel.iter().enumerate() {
                let sy = reflect_101(y + ky as i64 - 1, h);
                for (kx, &kv) in row.iter().enumerate() {
                    if kv == 0.0 {
                        continue;
                    }
                    let sx = reflect_101(x + kx as i64 - 1, w);
                    let p = image.get_pixel(sx as u32, sy as u32).0;
                    for c in 0..3 {
                        acc[c] += p[c] as f32 * kv;
                    }
                }
            }
            let px = out.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                px.0[c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

// ============================================================
// Geometry
// ============================================================

/// Contours of a binary mask, with everything outside the image as background
///
/// `find_contours` never starts a trace on column 0, so the mask is traced
/// inside a 1 px zero border and the points are shifted back.
pub fn outer_border_contours(mask: &GrayImage) -> Vec<Contour<u32>> {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    let mut contours = find_contours::<u32>(&padded);
    for contour in &mut contours {
        for point in &mut contour.points {
            point.x = point.x.saturating_sub(1);
            point.y = point.y.saturating_sub(1);
        }
    }
    contours
}

/// Area of a closed polygon given by its vertices (shoelace formula)
pub fn polygon_area(points: &[(f64, f64)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].0 * points[j].1;
        area -= points[j].0 * points[i].1;
    }
    area.abs() / 2.0
}
