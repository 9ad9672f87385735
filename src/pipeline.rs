//! Single-frame analysis in fixed order: locate/normalize, sample, decide.

use image::RgbaImage;
use tracing::debug;

use crate::config::OmrConfig;
use crate::detector::{GridLocator, MarkerDetector, PerspectiveNormalizer};
use crate::engine::Engine;
use crate::error::{OmrError, Result};
use crate::models::{
    AnalysisStats, AreaSource, FrameAnalysis, FrameTelemetry, NormalizedRect, clamp01,
};
use crate::reader::{CellSampler, DecisionEngine};

/// Input of one analysis call.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub image: &'a RgbaImage,
    /// Question numbers, one per printed row, top to bottom.
    pub question_order: &'a [u32],
    pub config: OmrConfig,
    /// Threshold floor; falls back to `config.decision.sensitivity`.
    pub sensitivity: Option<f64>,
    /// Operator-drawn answer area on the raw frame. Skips detection.
    pub area_override: Option<NormalizedRect>,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(image: &'a RgbaImage, question_order: &'a [u32]) -> Self {
        Self {
            image,
            question_order,
            config: OmrConfig::default(),
            sensitivity: None,
            area_override: None,
        }
    }

    pub fn with_config(mut self, config: OmrConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    pub fn with_area(mut self, area: NormalizedRect) -> Self {
        self.area_override = Some(area);
        self
    }
}

/// Analyze one frame on `engine`.
///
/// Missing fiducials and an unlocatable grid are not errors: the frame is
/// sampled unwarped inside the best rectangle available and the choice is
/// recorded in `telemetry`.
pub fn analyze_frame(engine: &Engine, request: &AnalysisRequest<'_>) -> Result<FrameAnalysis> {
    let config = &request.config;
    let grid = &config.grid;
    let rows = request.question_order.len();

    if rows == 0 {
        return Ok(FrameAnalysis {
            area: grid.answer_area(1),
            results: Vec::new(),
            stats: AnalysisStats::default(),
            telemetry: FrameTelemetry::default(),
        });
    }

    config.validate()?;
    let (width, height) = request.image.dimensions();
    if width == 0 || height == 0 {
        return Err(OmrError::invalid_input("image has no pixels"));
    }

    let sensitivity = clamp01(request.sensitivity.unwrap_or(config.decision.sensitivity));
    let sampler = CellSampler::new(rows, grid.columns, grid.cell_padding, config.markers.blur_sigma);
    let decision = DecisionEngine::new(config.decision);

    engine.install(|| {
        let image = request.image;
        // Owns the warped buffer for the rest of the call when normalization works
        let normalized;

        let (working, area, telemetry) = match request.area_override {
            Some(manual) => (
                image,
                manual.clamped(),
                FrameTelemetry {
                    area_source: AreaSource::Manual,
                    markers_found: 0,
                },
            ),
            None => {
                let candidates = MarkerDetector::find_candidates(image, &config.markers);
                let markers_found = candidates.len();
                match PerspectiveNormalizer::normalize_candidates(image, candidates, rows, grid) {
                    Some(result) => {
                        normalized = result;
                        (
                            &normalized.image,
                            normalized.area,
                            FrameTelemetry {
                                area_source: AreaSource::Canonical,
                                markers_found,
                            },
                        )
                    }
                    None => {
                        let (area, area_source) = match GridLocator::locate(image, &config.locator)
                        {
                            Some(rect) => (rect, AreaSource::Located),
                            None => (grid.answer_area(rows), AreaSource::Default),
                        };
                        (
                            image,
                            area,
                            FrameTelemetry {
                                area_source,
                                markers_found,
                            },
                        )
                    }
                }
            }
        };

        debug!(
            source = ?telemetry.area_source,
            markers = telemetry.markers_found,
            ?area,
            "sampling answer area"
        );

        let scores = sampler.sample(working, &area);
        let (results, stats) = decision.decide(request.question_order, scores, sensitivity);

        Ok(FrameAnalysis {
            area,
            results,
            stats,
            telemetry,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn engine() -> Engine {
        Engine::build(2).expect("engine")
    }

    #[test]
    fn test_empty_question_order() {
        let image = RgbaImage::new(0, 0);
        let analysis = analyze_frame(&engine(), &AnalysisRequest::new(&image, &[])).expect("ok");
        assert!(analysis.results.is_empty());
        assert_eq!(analysis.stats.samples, 0);
    }

    #[test]
    fn test_empty_image_is_invalid() {
        let image = RgbaImage::new(0, 0);
        let err = analyze_frame(&engine(), &AnalysisRequest::new(&image, &[1, 2])).unwrap_err();
        assert!(matches!(err, OmrError::InvalidInput { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_zero_columns_is_invalid() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let mut config = OmrConfig::default();
        config.grid.columns = 0;
        let request = AnalysisRequest::new(&image, &[1]).with_config(config);
        assert!(analyze_frame(&engine(), &request).is_err());
    }

    #[test]
    fn test_blank_frame_falls_back_to_default_area() {
        let image = RgbaImage::from_pixel(300, 400, Rgba([255, 255, 255, 255]));
        let order = [1, 2, 3];
        let analysis = analyze_frame(&engine(), &AnalysisRequest::new(&image, &order)).expect("ok");
        assert_eq!(analysis.telemetry.area_source, AreaSource::Default);
        assert_eq!(analysis.area, OmrConfig::default().grid.answer_area(3));
        assert_eq!(analysis.results.len(), 3);
        assert_eq!(analysis.stats.samples, 15);
        assert_eq!(analysis.detected_count(), 0);
    }

    #[test]
    fn test_manual_area_is_sampled_raw() {
        let mut image = RgbaImage::from_pixel(500, 200, Rgba([255, 255, 255, 255]));
        // One row, five columns of 100 px; fill column D
        for y in 0..200 {
            for x in 300..400 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let order = [42];
        let request = AnalysisRequest::new(&image, &order)
            .with_area(NormalizedRect::new(0.0, 0.0, 1.0, 1.0))
            .with_sensitivity(0.6);
        let analysis = analyze_frame(&engine(), &request).expect("ok");
        assert_eq!(analysis.telemetry.area_source, AreaSource::Manual);
        assert_eq!(analysis.results[0].ordem, 42);
        assert_eq!(analysis.results[0].detected.as_deref(), Some("D"));
        assert!(analysis.stats.threshold >= 0.6);
    }
}
