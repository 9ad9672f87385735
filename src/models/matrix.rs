use image::GrayImage;

/// Compact bit matrix for thresholded images (true = ink)
#[derive(Debug, Clone)]
pub struct BitMatrix {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BitMatrix {
    /// Create a new bit matrix with given dimensions
    pub fn new(width: usize, height: usize) -> Self {
        let bytes_needed = (width * height).div_ceil(8);
        Self {
            width,
            height,
            data: vec![0; bytes_needed],
        }
    }

    /// Get matrix width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get matrix height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Get bit at (x, y); out-of-bounds reads are false
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = y * self.width + x;
        (self.data[index / 8] >> (index % 8)) & 1 == 1
    }

    /// Set bit at (x, y); out-of-bounds writes are ignored
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y * self.width + x;
        if value {
            self.data[index / 8] |= 1 << (index % 8);
        } else {
            self.data[index / 8] &= !(1 << (index % 8));
        }
    }

    /// Count set bits inside a rectangle, ignoring the part outside the matrix
    pub fn count_in_rect(&self, x: usize, y: usize, width: usize, height: usize) -> usize {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        let mut count = 0usize;
        for row in y..y_end {
            for col in x..x_end {
                if self.get(col, row) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Total number of set bits
    pub fn count_ones(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Render as an 8-bit mask (255 = ink) for contour tracing
    pub fn to_mask_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            if self.get(x as usize, y as usize) {
                image::Luma([255u8])
            } else {
                image::Luma([0u8])
            }
        })
    }
}

impl Default for BitMatrix {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_matrix() {
        let mut matrix = BitMatrix::new(8, 8);
        matrix.set(3, 4, true);
        assert!(matrix.get(3, 4));
        assert!(!matrix.get(3, 3));
        matrix.set(3, 4, false);
        assert!(!matrix.get(3, 4));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut matrix = BitMatrix::new(8, 8);
        matrix.set(10, 10, true);
        assert!(!matrix.get(10, 10));
    }

    #[test]
    fn test_count_in_rect_clips_to_bounds() {
        let mut matrix = BitMatrix::new(10, 10);
        for y in 5..10 {
            for x in 5..10 {
                matrix.set(x, y, true);
            }
        }
        assert_eq!(matrix.count_ones(), 25);
        assert_eq!(matrix.count_in_rect(5, 5, 100, 100), 25);
        assert_eq!(matrix.count_in_rect(0, 0, 6, 6), 1);
        assert_eq!(matrix.count_in_rect(20, 20, 4, 4), 0);
    }

    #[test]
    fn test_mask_image() {
        let mut matrix = BitMatrix::new(3, 2);
        matrix.set(2, 1, true);
        let mask = matrix.to_mask_image();
        assert_eq!(mask.get_pixel(2, 1).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
    }
}
