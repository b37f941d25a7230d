//! Non-local means denoising for color pages
//!
//! Each output pixel is a weighted average of the pixels in a square search
//! window, weighted by how similar their surrounding template patches are.
//! Patch distances are evaluated one search offset at a time with an
//! integral image over the per-pixel squared difference, so the cost per
//! offset is linear in the image size regardless of the template size.

use image::RgbImage;
use rayon::prelude::*;
use tracing::trace;

use crate::filters::reflect_101;

/// Filter strength for luminance and color
pub const FILTER_STRENGTH: f32 = 3.0;

/// Side of the square patch compared between pixels
pub const TEMPLATE_WINDOW: usize = 7;

/// Side of the square window searched for similar patches
pub const SEARCH_WINDOW: usize = 21;

/// Reflect-101 padded copy of an RGB raster as interleaved floats
struct Padded {
    data: Vec<f32>,
    width: usize,
    pad: usize,
}

impl Padded {
    fn new(image: &RgbImage, pad: usize) -> Self {
        let (w, h) = (image.width() as i64, image.height() as i64);
        let width = w as usize + 2 * pad;
        let height = h as usize + 2 * pad;
        let raw = image.as_raw();

        let mut data = vec![0.0f32; width * height * 3];
        data.par_chunks_mut(width * 3).enumerate().for_each(|(py, row)| {
            let sy = reflect_101(py as i64 - pad as i64, h);
            for px in 0..width {
                let sx = reflect_101(px as i64 - pad as i64, w);
                let src = (sy * w as usize + sx) * 3;
                row[px * 3..px * 3 + 3].copy_from_slice(&[
                    raw[src] as f32,
                    raw[src + 1] as f32,
                    raw[src + 2] as f32,
                ]);
            }
        });

        Self { data, width, pad }
    }

    #[inline]
    fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let i = (y * self.width + x) * 3;
        &self.data[i..i + 3]
    }
}

/// Denoise with the default strength and window sizes
pub fn denoise(image: &RgbImage) -> RgbImage {
    denoise_with(image, FILTER_STRENGTH, TEMPLATE_WINDOW, SEARCH_WINDOW)
}

/// Non-local means with explicit parameters
///
/// Window sizes are forced odd. A zero `strength` returns the input.
pub fn denoise_with(image: &RgbImage, strength: f32, template: usize, search: usize) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || strength <= 0.0 {
        return image.clone();
    }

    let t_half = template / 2;
    let s_half = search / 2;
    let t_size = 2 * t_half + 1;
    let pad = t_half + s_half;
    let src = Padded::new(image, pad);

    // Diff plane covers every template around every output pixel
    let dw = w + 2 * t_half;
    let dh = h + 2 * t_half;
    let origin = pad - t_half;
    let norm = 1.0 / (t_size * t_size * 3) as f64;
    let inv_h2 = 1.0 / (strength as f64 * strength as f64);

    // [weight, r, g, b] per output pixel
    let mut acc = vec![[0.0f64; 4]; w * h];
    let mut integral = vec![0.0f64; (dw + 1) * (dh + 1)];

    for dy in -(s_half as i64)..=(s_half as i64) {
        for dx in -(s_half as i64)..=(s_half as i64) {
            // Row-wise prefix sums of the squared difference
            integral[..dw + 1].fill(0.0);
            integral[dw + 1..]
                .par_chunks_mut(dw + 1)
                .enumerate()
                .for_each(|(j, row)| {
                    let y = origin + j;
                    let oy = (y as i64 + dy) as usize;
                    row[0] = 0.0;
                    let mut running = 0.0f64;
                    for i in 0..dw {
                        let x = origin + i;
                        let ox = (x as i64 + dx) as usize;
                        let a = src.pixel(x, y);
                        let b = src.pixel(ox, oy);
                        let d: f32 = (0..3).map(|c| (a[c] - b[c]) * (a[c] - b[c])).sum();
                        running += d as f64;
                        row[i + 1] = running;
                    }
                });
            // Column accumulation
            for j in 1..=dh {
                let (prev, cur) = integral.split_at_mut(j * (dw + 1));
                let prev = &prev[(j - 1) * (dw + 1)..];
                for (c, p) in cur[..dw + 1].iter_mut().zip(prev) {
                    *c += p;
                }
            }

            let integral = &integral;
            acc.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
                let top = y * (dw + 1);
                let bottom = (y + t_size) * (dw + 1);
                let oy = (y + pad) as i64 + dy;
                for (x, slot) in row.iter_mut().enumerate() {
                    let ssd = integral[bottom + x + t_size] - integral[top + x + t_size]
                        - integral[bottom + x]
                        + integral[top + x];
                    let weight = (-(ssd * norm) * inv_h2).exp();
                    let ox = (x + pad) as i64 + dx;
                    let p = src.pixel(ox as usize, oy as usize);
                    slot[0] += weight;
                    slot[1] += weight * p[0] as f64;
                    slot[2] += weight * p[1] as f64;
                    slot[3] += weight * p[2] as f64;
                }
            });
        }
    }

    trace!(width, height, "Non-local means complete");

    let mut out = RgbImage::new(width, height);
    for (pixel, a) in out.pixels_mut().zip(&acc) {
        // The zero offset always contributes weight 1
        for c in 0..3 {
            pixel.0[c] = (a[c + 1] / a[0]).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn variance(img: &RgbImage) -> f64 {
        let values: Vec<f64> = img.pixels().map(|p| p.0[0] as f64).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_uniform_image_unchanged() {
        let img = RgbImage::from_pixel(30, 24, Rgb([180, 170, 160]));
        assert_eq!(denoise(&img), img);
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let img = RgbImage::from_fn(12, 12, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 7]));
        assert_eq!(denoise_with(&img, 0.0, 7, 21), img);
    }

    #[test]
    fn test_small_noise_is_reduced() {
        // Deterministic +-2 checker noise around 128
        let img = RgbImage::from_fn(32, 32, |x, y| {
            let v = if (x * 7 + y * 13) % 3 == 0 { 130 } else { 127 };
            Rgb([v, v, v])
        });
        let out = denoise(&img);
        assert!(variance(&out) < variance(&img));
    }

    #[test]
    fn test_strong_edge_preserved() {
        let img = RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgb([20, 20, 20])
            } else {
                Rgb([230, 230, 230])
            }
        });
        let out = denoise(&img);
        assert!(out.get_pixel(5, 10).0[0] < 30);
        assert!(out.get_pixel(35, 10).0[0] > 220);
    }

    #[test]
    fn test_tiny_image() {
        let img = RgbImage::from_pixel(1, 1, Rgb([9, 9, 9]));
        assert_eq!(denoise(&img).dimensions(), (1, 1));
    }
}
