use image::RgbaImage;
use rayon::prelude::*;

use crate::models::{BitMatrix, CellScore, NormalizedRect, PixelRect, clamp01, letter_for_column};
use crate::utils::binarization::otsu_binarize_inv;
use crate::utils::grayscale::blurred_grayscale;

/// Smallest sampled region edge, in pixels
pub const MIN_CELL_PX: i64 = 4;

/// Measures how much of each bubble is covered by ink.
#[derive(Debug, Clone, Copy)]
pub struct CellSampler {
    pub rows: usize,
    pub columns: usize,
    /// Fraction of each cell trimmed off, split evenly between both sides
    pub padding: f64,
    pub blur_sigma: f32,
}

impl CellSampler {
    pub fn new(rows: usize, columns: usize, padding: f64, blur_sigma: f32) -> Self {
        Self {
            rows,
            columns,
            padding,
            blur_sigma,
        }
    }

    /// Threshold `image` (blurred grayscale, inverse Otsu) and score every
    /// cell of `area`. One inner vector per row, one score per column.
    pub fn sample(&self, image: &RgbaImage, area: &NormalizedRect) -> Vec<Vec<CellScore>> {
        let (width, height) = image.dimensions();
        let blurred = blurred_grayscale(image, self.blur_sigma);
        let ink = otsu_binarize_inv(&blurred);
        self.sample_matrix(&ink, area.to_pixels(width, height))
    }

    /// Score every cell of an already thresholded image
    pub fn sample_matrix(&self, ink: &BitMatrix, area: PixelRect) -> Vec<Vec<CellScore>> {
        (0..self.rows)
            .into_par_iter()
            .map(|row| {
                (0..self.columns)
                    .map(|column| {
                        let region = self.cell_region(area, row, column);
                        CellScore {
                            letter: letter_for_column(column),
                            percent: fill_fraction(ink, region),
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Inset sampling region of one cell.
    ///
    /// Never smaller than `MIN_CELL_PX` on either side, and pulled back inside
    /// the area when the cell sits on its far edge.
    pub fn cell_region(&self, area: PixelRect, row: usize, column: usize) -> PixelRect {
        let row_height = area.height as f64 / self.rows.max(1) as f64;
        let column_width = area.width as f64 / self.columns.max(1) as f64;

        let top = (area.y as f64 + row as f64 * row_height).floor() as i64;
        let left = (area.x as f64 + column as f64 * column_width).floor() as i64;
        let height = (row_height.floor() as i64).max(MIN_CELL_PX);
        let width = (column_width.floor() as i64).max(MIN_CELL_PX);

        let pad_x = (width as f64 * self.padding * 0.5).floor() as i64;
        let pad_y = (height as f64 * self.padding * 0.5).floor() as i64;

        let x = area.x.max((left + pad_x).min(area.right() - MIN_CELL_PX));
        let y = area.y.max((top + pad_y).min(area.bottom() - MIN_CELL_PX));
        let w = MIN_CELL_PX.max((width - 2 * pad_x).min(area.right() - x));
        let h = MIN_CELL_PX.max((height - 2 * pad_y).min(area.bottom() - y));

        PixelRect::new(x, y, w, h)
    }
}

/// Ink pixels over region area, in [0, 1]; pixels outside the matrix count as paper
fn fill_fraction(ink: &BitMatrix, region: PixelRect) -> f64 {
    let total = region.area();
    if total == 0 {
        return 0.0;
    }
    let x = region.x.max(0) as usize;
    let y = region.y.max(0) as usize;
    let w = (region.right().max(0) as usize).saturating_sub(x);
    let h = (region.bottom().max(0) as usize).saturating_sub(y);
    let filled = ink.count_in_rect(x, y, w, h);
    clamp01(filled as f64 / total as f64)
}
