//! Unit-gain 3x3 sharpening

use image::RgbImage;

use crate::filters::convolve3x3;

/// Laplacian-style sharpening kernel (sums to 1)
pub const SHARPEN_KERNEL: [[f32; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]];

pub fn sharpen(image: &RgbImage) -> RgbImage {
    convolve3x3(image, &SHARPEN_KERNEL)
}
