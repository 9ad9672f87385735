use crate::models::BitMatrix;
use image::GrayImage;

/// Inverse Otsu binarization: true = ink (darker than the Otsu level)
pub fn otsu_binarize_inv(gray: &GrayImage) -> BitMatrix {
    let threshold = calculate_otsu_threshold(gray.as_raw());
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let mut binary = BitMatrix::new(width, height);

    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] < threshold {
            binary.set(x as usize, y as usize, true);
        }
    }

    binary
}

/// Calculate Otsu's optimal threshold
pub(crate) fn calculate_otsu_threshold(gray: &[u8]) -> u8 {
    let mut histogram = [0u64; 256];
    for &pixel in gray {
        histogram[pixel as usize] += 1;
    }

    let total_pixels = gray.len() as f64;
    let total_sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as u64 * count)
        .sum();

    let mut max_variance = 0.0;
    let mut optimal_threshold = 128u8;
    let mut class1_pixels = 0u64;
    let mut class1_sum = 0u64;

    // Class 1 holds intensities strictly below the candidate threshold
    for threshold in 1..=255usize {
        class1_pixels += histogram[threshold - 1];
        class1_sum += (threshold as u64 - 1) * histogram[threshold - 1];
        let class2_pixels = gray.len() as u64 - class1_pixels;

        if class1_pixels == 0 || class2_pixels == 0 {
            continue;
        }

        let class1_mean = class1_sum as f64 / class1_pixels as f64;
        let class2_mean = (total_sum - class1_sum) as f64 / class2_pixels as f64;

        let weight1 = class1_pixels as f64 / total_pixels;
        let weight2 = class2_pixels as f64 / total_pixels;

        let variance = weight1 * weight2 * (class1_mean - class2_mean).powi(2);

        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold as u8;
        }
    }

    optimal_threshold
}

/// Inverse adaptive binarization against the local box mean.
///
/// A pixel is ink when it is at least `offset` below the mean of the
/// `block_size` x `block_size` window around it (window clipped at the
/// borders). A uniform image therefore produces no ink at all.
pub fn adaptive_binarize_inv(gray: &GrayImage, block_size: u32, offset: i32) -> BitMatrix {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let mut binary = BitMatrix::new(width, height);
    if width == 0 || height == 0 {
        return binary;
    }

    let integral = integral_image(gray.as_raw(), width, height);
    let stride = width + 1;
    let radius = (block_size / 2) as usize;

    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(width);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let mean = (sum as f64 / count as f64).round() as i32;
            let pixel = gray.as_raw()[y * width + x] as i32;
            if pixel <= mean - offset {
                binary.set(x, y, true);
            }
        }
    }

    binary
}

/// Summed-area table with a zero first row and column
fn integral_image(gray: &[u8], width: usize, height: usize) -> Vec<u64> {
    let stride = width + 1;
    let mut integral = vec![0u64; stride * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += gray[y * width + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
    integral
}
