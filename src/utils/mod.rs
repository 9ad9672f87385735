//! Utility functions for image processing
//!
//! - Grayscale conversion (RGBA to luminance) and blur
//! - Binarization (Otsu's method and local-mean adaptive)
//! - Geometry (polygon measurements)

pub mod binarization;
pub mod geometry;
pub mod grayscale;
