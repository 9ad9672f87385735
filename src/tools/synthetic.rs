use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::Projection;
use rayon::prelude::*;

use crate::config::GridConfig;
use crate::models::Point;

const INK: [u8; 4] = [25, 25, 25, 255];
const PAPER: [u8; 4] = [250, 250, 250, 255];
const DESK: [u8; 4] = [255, 255, 255, 255];

/// Gap between a filled mark and its cell border, in millimeters.
const MARK_INSET_MM: f64 = 0.5;

/// One pen mark, covering `coverage` of the cell width from its left edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mark {
    pub row: usize,
    pub column: usize,
    pub coverage: f64,
}

/// A printed answer sheet with four fiducials and some filled bubbles.
///
/// The page is the grid frame of `GridConfig` plus `margin_mm` on every side;
/// fiducial centroids sit `marker_inset_mm()` outside each frame corner.
/// Optionally the page is photographed under perspective: `keystone` gives
/// where the page corners (TL, TR, BL, BR) land in the output image.
#[derive(Debug, Clone)]
pub struct SyntheticSheet {
    pub grid: GridConfig,
    pub rows: usize,
    pub marks: Vec<Mark>,
    pub px_per_mm: f64,
    pub margin_mm: f64,
    pub keystone: Option<[Point; 4]>,
}

impl SyntheticSheet {
    pub fn new(grid: GridConfig, rows: usize) -> Self {
        let margin_mm = grid.marker_offset_mm + 4.0;
        Self {
            grid,
            rows,
            marks: Vec::new(),
            px_per_mm: 4.0,
            margin_mm,
            keystone: None,
        }
    }

    /// Fully fill one column per row; `None` leaves the row blank.
    pub fn with_answers(mut self, answers: &[Option<usize>]) -> Self {
        for (row, answer) in answers.iter().enumerate() {
            if let Some(column) = *answer {
                self.marks.push(Mark {
                    row,
                    column,
                    coverage: 1.0,
                });
            }
        }
        self
    }

    pub fn with_mark(mut self, row: usize, column: usize, coverage: f64) -> Self {
        self.marks.push(Mark {
            row,
            column,
            coverage,
        });
        self
    }

    pub fn with_resolution(mut self, px_per_mm: f64) -> Self {
        self.px_per_mm = px_per_mm;
        self
    }

    pub fn with_keystone(mut self, corners: [Point; 4]) -> Self {
        self.keystone = Some(corners);
        self
    }

    /// Page size in millimeters
    pub fn page_mm(&self) -> (f64, f64) {
        (
            self.grid.total_width_mm() + 2.0 * self.margin_mm,
            self.grid.total_height_mm(self.rows) + 2.0 * self.margin_mm,
        )
    }

    /// Output image size in pixels
    pub fn size_px(&self) -> (u32, u32) {
        let (w, h) = self.page_mm();
        (
            (w * self.px_per_mm).round().max(1.0) as u32,
            (h * self.px_per_mm).round().max(1.0) as u32,
        )
    }

    /// Page corners (TL, TR, BL, BR) in output pixels without distortion
    pub fn flat_corners(&self) -> [Point; 4] {
        let (w, h) = self.size_px();
        let (w, h) = (w as f64, h as f64);
        [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(0.0, h),
            Point::new(w, h),
        ]
    }

    /// Pull the top corners in by `fraction` of the width, as if the camera
    /// were tilted toward the bottom of the page.
    pub fn tilted_corners(&self, fraction: f64) -> [Point; 4] {
        let [tl, tr, bl, br] = self.flat_corners();
        let inset = tr.x * fraction;
        [
            tl.translate(inset, inset * 0.5),
            tr.translate(-inset, inset * 0.2),
            bl,
            br,
        ]
    }

    pub fn render(&self) -> RgbaImage {
        let (width, height) = self.size_px();
        let mut out = RgbaImage::from_pixel(width, height, Rgba(DESK));

        let (page_w, page_h) = self.page_mm();
        let (w_mm, h_mm) = (page_w as f32, page_h as f32);
        let page = [(0.0, 0.0), (w_mm, 0.0), (0.0, h_mm), (w_mm, h_mm)];
        let photo = self.keystone.unwrap_or_else(|| self.flat_corners());
        let Some(to_page) = Projection::from_control_points(photo.map(|p| p.to_f32()), page)
        else {
            return out;
        };

        let row_len = width as usize * 4;
        out.as_mut()
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..width as usize {
                    let (px, py) = to_page * (x as f32 + 0.5, y as f32 + 0.5);
                    let mm = Point::new(px as f64, py as f64);
                    if !mm.is_finite() {
                        continue;
                    }
                    let color = if mm.x < 0.0 || mm.y < 0.0 || mm.x > page_w || mm.y > page_h {
                        DESK
                    } else if self.is_ink(mm) {
                        INK
                    } else {
                        PAPER
                    };
                    row[x * 4..x * 4 + 4].copy_from_slice(&color);
                }
            });

        out
    }

    /// Fiducial centroids in page millimeters (TL, TR, BL, BR)
    pub fn marker_centres_mm(&self) -> [Point; 4] {
        let inset = self.grid.marker_inset_mm();
        let left = self.margin_mm - inset;
        let top = self.margin_mm - inset;
        let right = self.margin_mm + self.grid.total_width_mm() + inset;
        let bottom = self.margin_mm + self.grid.total_height_mm(self.rows) + inset;
        [
            Point::new(left, top),
            Point::new(right, top),
            Point::new(left, bottom),
            Point::new(right, bottom),
        ]
    }

    fn is_ink(&self, mm: Point) -> bool {
        let half = self.grid.marker_size_mm / 2.0;
        let on_marker = self
            .marker_centres_mm()
            .iter()
            .any(|c| (mm.x - c.x).abs() <= half && (mm.y - c.y).abs() <= half);
        if on_marker {
            return true;
        }

        let grid = &self.grid;
        let first_cell_x = self.margin_mm + grid.padding_mm.left + grid.label_column_mm;
        let first_cell_y = self.margin_mm + grid.padding_mm.top;
        self.marks.iter().any(|mark| {
            let x0 = first_cell_x + mark.column as f64 * grid.choice_column_mm + MARK_INSET_MM;
            let y0 = first_cell_y + mark.row as f64 * grid.row_height_mm + MARK_INSET_MM;
            let full_w = grid.choice_column_mm - 2.0 * MARK_INSET_MM;
            let h = grid.row_height_mm - 2.0 * MARK_INSET_MM;
            let w = full_w * mark.coverage.clamp(0.0, 1.0);
            mm.x >= x0 && mm.x < x0 + w && mm.y >= y0 && mm.y < y0 + h
        })
    }
}
