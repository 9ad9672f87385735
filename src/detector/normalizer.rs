use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::debug;

use super::markers::{MarkerCandidate, MarkerDetector};
use crate::config::{GridConfig, MarkerConfig};
use crate::models::{NormalizedRect, Point};

/// Fill for canonical pixels that fall outside the photo; reads as paper.
const PAPER_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Perspective-corrected sheet in the canonical layout.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Warped image, `GridConfig::canonical_size(rows)` pixels.
    pub image: RgbaImage,
    /// Answer cells inside `image`, derived from the layout constants.
    pub area: NormalizedRect,
    /// Candidates that survived filtering (at least four).
    pub markers_found: usize,
}

pub struct PerspectiveNormalizer;

impl PerspectiveNormalizer {
    /// Warp `image` into the canonical layout for `rows` questions.
    ///
    /// Returns `None` when fewer than four fiducials are found or the corner
    /// geometry is degenerate; the caller then samples the raw frame.
    pub fn normalize(
        image: &RgbaImage,
        rows: usize,
        grid: &GridConfig,
        markers: &MarkerConfig,
    ) -> Option<Normalized> {
        let candidates = MarkerDetector::find_candidates(image, markers);
        Self::normalize_candidates(image, candidates, rows, grid)
    }

    /// Same as [`PerspectiveNormalizer::normalize`] with the fiducial search
    /// already done.
    pub fn normalize_candidates(
        image: &RgbaImage,
        candidates: Vec<MarkerCandidate>,
        rows: usize,
        grid: &GridConfig,
    ) -> Option<Normalized> {
        if candidates.len() < 4 {
            debug!(found = candidates.len(), "not enough fiducials, skipping warp");
            return None;
        }
        let markers_found = candidates.len();

        let corners = Self::order_corners(candidates);
        let source = Self::grid_corners(&corners, grid)?;

        let (width, height) = grid.canonical_size(rows);
        let (w, h) = (width as f32, height as f32);
        let destination = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];

        let Some(projection) =
            Projection::from_control_points(source.map(|p| p.to_f32()), destination)
        else {
            debug!(?source, "degenerate fiducial geometry, skipping warp");
            return None;
        };

        let mut warped = RgbaImage::new(width, height);
        warp_into(image, &projection, Interpolation::Bilinear, PAPER_FILL, &mut warped);

        Some(Normalized {
            image: warped,
            area: grid.answer_area(rows),
            markers_found,
        })
    }

    /// Four largest candidates as top-left, top-right, bottom-left, bottom-right.
    pub fn order_corners(mut candidates: Vec<MarkerCandidate>) -> [MarkerCandidate; 4] {
        candidates.sort_by(|a, b| b.size.total_cmp(&a.size));
        candidates.truncate(4);
        candidates.sort_by(|a, b| a.center.y.total_cmp(&b.center.y));

        let mut ordered = [MarkerCandidate {
            center: Point::default(),
            size: 0.0,
        }; 4];
        for (slot, candidate) in ordered.iter_mut().zip(candidates) {
            *slot = candidate;
        }
        let (top, bottom) = ordered.split_at_mut(2);
        top.sort_by(|a, b| a.center.x.total_cmp(&b.center.x));
        bottom.sort_by(|a, b| a.center.x.total_cmp(&b.center.x));
        ordered
    }

    /// Grid frame corners: each centroid moved toward the interior by the
    /// printed centroid-to-corner distance, scaled by the observed marker size.
    fn grid_corners(corners: &[MarkerCandidate; 4], grid: &GridConfig) -> Option<[Point; 4]> {
        let avg_size = corners.iter().map(|c| c.size).sum::<f64>() / 4.0;
        let px_per_mm = avg_size / grid.marker_size_mm;
        let offset = px_per_mm * grid.marker_inset_mm();
        if !offset.is_finite() || avg_size <= 0.0 {
            return None;
        }

        let [tl, tr, bl, br] = corners;
        let points = [
            tl.center.translate(offset, offset),
            tr.center.translate(-offset, offset),
            bl.center.translate(offset, -offset),
            br.center.translate(-offset, -offset),
        ];
        points.iter().all(Point::is_finite).then_some(points)
    }
}
