use image::RgbaImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point as PixelPoint;
use tracing::trace;

use crate::config::MarkerConfig;
use crate::models::Point;
use crate::utils::binarization::adaptive_binarize_inv;
use crate::utils::geometry::{
    bounding_box, drop_seam_vertex, is_convex, polygon_area, polygon_moments,
};
use crate::utils::grayscale::blurred_grayscale;

/// A square blob that may be one of the four printed fiducials
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerCandidate {
    /// Centroid from polygon moments
    pub center: Point,
    /// Mean of bounding box width and height, in pixels
    pub size: f64,
}

pub struct MarkerDetector;

impl MarkerDetector {
    /// Find every convex quadrilateral that is large and square enough to be
    /// a fiducial. Order is contour-discovery order.
    pub fn find_candidates(image: &RgbaImage, config: &MarkerConfig) -> Vec<MarkerCandidate> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let blurred = blurred_grayscale(image, config.blur_sigma);
        let ink = adaptive_binarize_inv(&blurred, config.block_size, config.offset);
        let mask = ink.to_mask_image();
        let min_area = width as f64 * height as f64 * config.min_area_fraction;

        let mut candidates = Vec::new();
        for contour in find_contours::<i32>(&mask) {
            // External borders only
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            if let Some(candidate) = Self::evaluate(&contour.points, min_area, config) {
                candidates.push(candidate);
            }
        }

        trace!(count = candidates.len(), "marker candidates");
        candidates
    }

    fn evaluate(
        contour: &[PixelPoint<i32>],
        min_area: f64,
        config: &MarkerConfig,
    ) -> Option<MarkerCandidate> {
        if contour.len() < 4 {
            return None;
        }
        let epsilon = config.approx_epsilon * arc_length(contour, true);
        if epsilon.is_nan() || epsilon <= 0.0 {
            return None;
        }
        let simplified = approximate_polygon_dp(contour, epsilon, true);
        let approx = drop_seam_vertex(simplified.into_iter().map(Point::from).collect(), epsilon);
        if approx.len() != 4 || !is_convex(&approx) {
            return None;
        }

        let area = polygon_area(&approx);
        if area < min_area {
            trace!(area, min_area, "rejecting small quadrilateral");
            return None;
        }

        let (_, _, bw, bh) = bounding_box(&approx);
        let aspect = bw / bh;
        if aspect < config.min_aspect || aspect > config.max_aspect {
            trace!(aspect, "rejecting non-square quadrilateral");
            return None;
        }

        let (m00, m10, m01) = polygon_moments(&approx);
        if m00 == 0.0 {
            return None;
        }

        Some(MarkerCandidate {
            center: Point::new(m10 / m00, m01 / m00),
            size: (bw + bh) / 2.0,
        })
    }
}
