/// Luma conversion for RGBA frames
/// Y = 0.299*R + 0.587*G + 0.114*B
/// Uses fast integer arithmetic: Y = (76*R + 150*G + 29*B) >> 8
use image::{GrayImage, RgbaImage};
use rayon::prelude::*;

/// Coefficients for grayscale conversion: Y = (76*R + 150*G + 29*B) >> 8
const COEF_R: u32 = 76;
const COEF_G: u32 = 150;
const COEF_B: u32 = 29;

/// Integer luma of one pixel (alpha ignored)
#[inline]
pub fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    let lum = (COEF_R * r as u32 + COEF_G * g as u32 + COEF_B * b as u32) >> 8;
    lum.min(255) as u8
}

/// Exact luma in [0, 1]
#[inline]
pub fn luma_unit(r: u8, g: u8, b: u8) -> f64 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0
}

/// Convert an RGBA frame to grayscale, processing rows in parallel
pub fn rgba_to_grayscale(rgba: &RgbaImage) -> GrayImage {
    let (width, height) = rgba.dimensions();
    let mut gray = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return gray;
    }

    let src: &[u8] = rgba.as_raw();
    let row_len = width as usize;
    gray.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let row_start = y * row_len * 4;
        for (x, out) in row.iter_mut().enumerate() {
            let idx = row_start + x * 4;
            *out = luma_u8(src[idx], src[idx + 1], src[idx + 2]);
        }
    });

    gray
}

/// Grayscale followed by a Gaussian blur, the common front end of both
/// threshold paths.
pub fn blurred_grayscale(rgba: &RgbaImage, sigma: f32) -> GrayImage {
    let gray = rgba_to_grayscale(rgba);
    if gray.width() == 0 || gray.height() == 0 {
        return gray;
    }
    imageproc::filter::gaussian_blur_f32(&gray, sigma)
}
