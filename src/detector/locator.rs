use image::RgbaImage;
use tracing::debug;

use crate::config::LocatorConfig;
use crate::models::NormalizedRect;
use crate::utils::grayscale::luma_unit;

/// Finds the bounding box of dark print below the sheet header.
///
/// Rotation-naive and cheap: it subsamples on a coarse stride and only
/// serves as a seed when fiducials cannot be found.
pub struct GridLocator;

impl GridLocator {
    pub fn locate(image: &RgbaImage, config: &LocatorConfig) -> Option<NormalizedRect> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let (w, h) = (width as i64, height as i64);

        let divisor = config.stride_divisor.max(1) as i64;
        let step = (w.min(h) / divisor).max(config.min_stride.max(1) as i64) as usize;
        let y_start = (h as f64 * config.top_margin).floor() as i64;
        let pad_x = (w as f64 * config.side_margin).floor() as i64;

        let mut min_x = w;
        let mut max_x = 0i64;
        let mut min_y = h;
        let mut max_y = 0i64;
        let mut found = false;

        for y in (y_start.max(0)..h).step_by(step) {
            for x in (pad_x.max(0)..w - pad_x).step_by(step) {
                let p = image.get_pixel(x as u32, y as u32).0;
                if luma_unit(p[0], p[1], p[2]) < config.luma_cutoff {
                    found = true;
                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                    min_y = min_y.min(y);
                    max_y = max_y.max(y);
                }
            }
        }

        if !found || max_x <= min_x || max_y <= min_y {
            debug!(width, height, "grid locator found no dark region");
            return None;
        }

        let margin_x = ((max_x - min_x) as f64 * config.expand).floor() as i64;
        let margin_y = ((max_y - min_y) as f64 * config.expand).floor() as i64;
        let min_x = (min_x - margin_x).max(0);
        let min_y = (min_y - margin_y).max(0);
        let max_x = (max_x + margin_x).min(w - 1);
        let max_y = (max_y + margin_y).min(h - 1);

        Some(NormalizedRect::new(
            min_y as f64 / h as f64,
            min_x as f64 / w as f64,
            (max_x - min_x) as f64 / w as f64,
            (max_y - min_y) as f64 / h as f64,
        ))
    }
}
