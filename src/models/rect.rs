use serde::{Deserialize, Serialize};

/// Clamp into [0, 1], mapping NaN to 0.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Rectangle expressed as fractions of the image dimensions.
///
/// Constructed values are always clamped: every field lies in [0, 1] and the
/// rectangle never extends past the right or bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        let top = clamp01(top);
        let left = clamp01(left);
        Self {
            top,
            left,
            width: clamp01(width).min(1.0 - left),
            height: clamp01(height).min(1.0 - top),
        }
    }

    /// Build from percentages (0..100), as entered by an operator.
    pub fn from_percent(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self::new(top / 100.0, left / 100.0, width / 100.0, height / 100.0)
    }

    /// Re-apply the clamping invariants (e.g. after deserialization).
    pub fn clamped(self) -> Self {
        Self::new(self.top, self.left, self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Absolute pixel box for an image of the given size (floored, like the
    /// sampling grid that consumes it).
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> PixelRect {
        let w = image_width as f64;
        let h = image_height as f64;
        PixelRect {
            x: (self.left * w).floor() as i64,
            y: (self.top * h).floor() as i64,
            width: (self.width * w).floor() as i64,
            height: (self.height * h).floor() as i64,
        }
    }
}

/// Integer pixel rectangle. Signed so intermediate clamping math cannot wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl PixelRect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) * self.height.max(0)
    }
}
