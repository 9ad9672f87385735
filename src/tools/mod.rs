//! Helpers shared by the `omrtool` binary, benches and integration tests.

use crate::config;
use crate::error::{OmrError, Result};
use crate::models::BitMatrix;
use image::{GenericImageView, RgbaImage};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Rendering of printed answer sheets with known marks
pub mod synthetic;

/// Load an image as RGBA, downscaled so its longest side is at most
/// `OMR_MAX_DIM` when that variable is set.
pub fn load_rgba<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let img = image::open(path).map_err(|e| OmrError::image("opening image", e))?;
    let rgba = match config::max_dim() {
        Some(max_dim) if img.dimensions().0.max(img.dimensions().1) > max_dim => img
            .resize(max_dim, max_dim, image::imageops::FilterType::Triangle)
            .to_rgba8(),
        _ => img.to_rgba8(),
    };
    Ok(rgba)
}

/// Save an RGBA image; the format follows the file extension.
pub fn save_rgba<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
    image
        .save(path)
        .map_err(|e| OmrError::image("saving image", e))
}

/// Summary statistics for a thresholded image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkStats {
    /// Count of ink pixels.
    pub ink_pixels: usize,
    /// Total pixels in the matrix.
    pub total_pixels: usize,
    /// Ratio of ink pixels to total pixels.
    pub ink_ratio: f64,
}

/// Compute ink coverage for a binary matrix.
pub fn ink_stats(binary: &BitMatrix) -> InkStats {
    let ink = binary.count_ones();
    let total = binary.width() * binary.height();
    let ratio = if total == 0 {
        0.0
    } else {
        ink as f64 / total as f64
    };
    InkStats {
        ink_pixels: ink,
        total_pixels: total,
        ink_ratio: ratio,
    }
}

/// Directory of sheet photos used by the pipeline benchmark, if any.
pub fn dataset_root_from_env() -> Option<PathBuf> {
    env::var("OMR_DATASET_ROOT").ok().map(PathBuf::from)
}

/// Image files under `root` (recursively), sorted, optionally truncated.
pub fn dataset_iter<P: AsRef<Path>>(root: P, limit: Option<usize>) -> impl Iterator<Item = PathBuf> {
    let mut images = collect_images(root.as_ref());
    images.sort();
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    images.into_iter()
}

fn collect_images(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut images = Vec::new();

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if ext == "png" || ext == "jpg" || ext == "jpeg" || ext == "bmp" || ext == "webp" {
                    images.push(path);
                }
            }
        }
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("rust_omr_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn test_ink_stats() {
        let mut matrix = BitMatrix::new(4, 5);
        matrix.set(0, 0, true);
        matrix.set(3, 4, true);
        let stats = ink_stats(&matrix);
        assert_eq!(stats.ink_pixels, 2);
        assert_eq!(stats.total_pixels, 20);
        assert!((stats.ink_ratio - 0.1).abs() < 1e-12);
        assert_eq!(ink_stats(&BitMatrix::default()).ink_ratio, 0.0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = temp_dir("roundtrip");
        let path = dir.join("sheet.png");
        let image = RgbaImage::from_fn(8, 6, |x, y| image::Rgba([x as u8 * 30, y as u8 * 40, 0, 255]));
        save_rgba(&image, &path).expect("save");
        let loaded = load_rgba(&path).expect("load");
        assert_eq!(loaded, image);

        let listed: Vec<PathBuf> = dataset_iter(&dir, None).collect();
        assert_eq!(listed, vec![path]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_is_an_image_error() {
        let err = load_rgba("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, OmrError::Image { .. }));
    }
}
