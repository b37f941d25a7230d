//! Contrast-limited adaptive histogram equalization on luminance
//!
//! The page is converted to CIE L*a*b*, CLAHE is applied to L only, and the
//! untouched a*/b* channels are recombined so ink and paper tints keep their
//! hue.

use image::{GrayImage, Luma, Rgb, RgbImage};
use rayon::prelude::*;

use crate::filters::reflect_101;

// ============================================================
// Constants
// ============================================================

/// Histogram clip limit (relative to a uniform histogram)
pub const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// Tile grid (columns, rows)
pub const CLAHE_TILE_GRID: (u32, u32) = (8, 8);

const HIST_SIZE: usize = 256;

/// D65 reference white
const XN: f32 = 0.950456;
const ZN: f32 = 1.088754;

/// CIE epsilon / kappa
const LAB_EPSILON: f32 = 0.008856;
const LAB_KAPPA: f32 = 903.3;

// ============================================================
// Color conversion
// ============================================================

/// A page split into 8-bit scaled lightness and float chrominance
#[derive(Debug, Clone)]
pub struct LabPlanes {
    /// L* scaled to 0..=255
    pub lightness: GrayImage,
    /// a* per pixel (unscaled)
    pub a: Vec<f32>,
    /// b* per pixel (unscaled)
    pub b: Vec<f32>,
}

fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    let cube = t * t * t;
    if cube > LAB_EPSILON {
        cube
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

/// Convert one sRGB pixel to (L*, a*, b*)
pub fn rgb_to_lab(pixel: [u8; 3]) -> (f32, f32, f32) {
    let r = srgb_to_linear(pixel[0] as f32 / 255.0);
    let g = srgb_to_linear(pixel[1] as f32 / 255.0);
    let b = srgb_to_linear(pixel[2] as f32 / 255.0);

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / XN;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / ZN;

    let fy = lab_f(y);
    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        LAB_KAPPA * y
    };
    (l, 500.0 * (lab_f(x) - fy), 200.0 * (fy - lab_f(z)))
}

/// Convert (L*, a*, b*) back to an sRGB pixel
pub fn lab_to_rgb(l: f32, a: f32, b: f32) -> [u8; 3] {
    let fy = (l + 16.0) / 116.0;
    let y = if l > LAB_KAPPA * LAB_EPSILON {
        fy * fy * fy
    } else {
        l / LAB_KAPPA
    };
    let x = lab_f_inv(fy + a / 500.0) * XN;
    let z = lab_f_inv(fy - b / 200.0) * ZN;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    let encode = |v: f32| (linear_to_srgb(v.clamp(0.0, 1.0)) * 255.0).round().clamp(0.0, 255.0) as u8;
    [encode(r), encode(g), encode(bl)]
}

/// Split an RGB raster into Lab planes
pub fn split_lab(image: &RgbImage) -> LabPlanes {
    let (width, height) = image.dimensions();
    let lab: Vec<(f32, f32, f32)> = image
        .as_raw()
        .par_chunks_exact(3)
        .map(|p| rgb_to_lab([p[0], p[1], p[2]]))
        .collect();

    let mut lightness = GrayImage::new(width, height);
    for (pixel, (l, _, _)) in lightness.pixels_mut().zip(&lab) {
        *pixel = Luma([(l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8]);
    }

    LabPlanes {
        lightness,
        a: lab.iter().map(|v| v.1).collect(),
        b: lab.iter().map(|v| v.2).collect(),
    }
}

/// Recombine Lab planes into an RGB raster
pub fn merge_lab(planes: &LabPlanes) -> RgbImage {
    let (width, height) = planes.lightness.dimensions();
    let mut out = RgbImage::new(width, height);
    for (i, (pixel, l8)) in out.pixels_mut().zip(planes.lightness.pixels()).enumerate() {
        let l = l8.0[0] as f32 * 100.0 / 255.0;
        *pixel = Rgb(lab_to_rgb(l, planes.a[i], planes.b[i]));
    }
    out
}

// ============================================================
// CLAHE
// ============================================================

/// Clip a tile histogram and redistribute the excess uniformly
fn clip_histogram(hist: &mut [u32; HIST_SIZE], clip_limit: u32) {
    let mut clipped = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip_limit {
            clipped += *bin - clip_limit;
            *bin = clip_limit;
        }
    }

    let batch = clipped / HIST_SIZE as u32;
    let mut residual = clipped - batch * HIST_SIZE as u32;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (HIST_SIZE / residual as usize).max(1);
        let mut i = 0;
        while i < HIST_SIZE && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

/// Contrast-limited adaptive histogram equalization
///
/// Images whose size is not a multiple of the grid are padded (reflect-101)
/// for the histogram pass only; output keeps the input size.
pub fn clahe(src: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> GrayImage {
    let (width, height) = src.dimensions();
    let (tiles_x, tiles_y) = (grid.0.max(1), grid.1.max(1));
    if width == 0 || height == 0 {
        return src.clone();
    }

    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let tile_area = tile_w * tile_h;
    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f32 / HIST_SIZE as f32) as u32).max(1)
    } else {
        u32::MAX
    };
    let lut_scale = (HIST_SIZE - 1) as f32 / tile_area as f32;

    let luts: Vec<[u8; HIST_SIZE]> = (0..tiles_x * tiles_y)
        .into_par_iter()
        .map(|tile| {
            let tx = tile % tiles_x;
            let ty = tile / tiles_x;
            let mut hist = [0u32; HIST_SIZE];
            for j in 0..tile_h {
                let sy = reflect_101((ty * tile_h + j) as i64, height as i64) as u32;
                for i in 0..tile_w {
                    let sx = reflect_101((tx * tile_w + i) as i64, width as i64) as u32;
                    hist[src.get_pixel(sx, sy).0[0] as usize] += 1;
                }
            }

            clip_histogram(&mut hist, clip);

            let mut lut = [0u8; HIST_SIZE];
            let mut sum = 0u32;
            for (v, count) in hist.iter().enumerate() {
                sum += count;
                lut[v] = (sum as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
            }
            lut
        })
        .collect();

    let lut_at = |tx: u32, ty: u32, v: u8| luts[(ty * tiles_x + tx) as usize][v as usize] as f32;
    let w = width as usize;

    let mut buffer = vec![0u8; w * height as usize];
    buffer.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let tyf = y as f32 / tile_h as f32 - 0.5;
        let ty1f = tyf.floor();
        let ya = tyf - ty1f;
        let ty1 = (ty1f as i64).max(0) as u32;
        let ty2 = ((ty1f as i64 + 1) as u32).min(tiles_y - 1);

        for (x, out) in row.iter_mut().enumerate() {
            let txf = x as f32 / tile_w as f32 - 0.5;
            let tx1f = txf.floor();
            let xa = txf - tx1f;
            let tx1 = (tx1f as i64).max(0) as u32;
            let tx2 = ((tx1f as i64 + 1).max(0) as u32).min(tiles_x - 1);

            let v = src.get_pixel(x as u32, y as u32).0[0];
            let top = lut_at(tx1, ty1, v) * (1.0 - xa) + lut_at(tx2, ty1, v) * xa;
            let bottom = lut_at(tx1, ty2, v) * (1.0 - xa) + lut_at(tx2, ty2, v) * xa;
            *out = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
        }
    });

    GrayImage::from_raw(width, height, buffer).unwrap_or_else(|| src.clone())
}

/// Equalize lightness locally while preserving chrominance
pub fn enhance_contrast(image: &RgbImage) -> RgbImage {
    let mut planes = split_lab(image);
    planes.lightness = clahe(&planes.lightness, CLAHE_CLIP_LIMIT, CLAHE_TILE_GRID);
    merge_lab(&planes)
}
