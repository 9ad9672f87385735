use std::sync::Arc;

use image::RgbaImage;
use tracing::info;

use crate::config::OmrConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::models::{FrameAnalysis, NormalizedRect};
use crate::pipeline::{AnalysisRequest, analyze_frame};

/// The trusted re-analysis of a frozen capture.
///
/// Only results from here can become answers; live previews are advisory.
pub trait AuthoritativeAnalyzer {
    fn reanalyze(&self, frame: &RgbaImage, question_order: &[u32]) -> Result<FrameAnalysis>;
}

/// Runs this crate's own pipeline, to completion, on the capture.
#[derive(Debug, Clone)]
pub struct LocalAuthority {
    engine: Arc<Engine>,
    config: OmrConfig,
    sensitivity: Option<f64>,
    area: Option<NormalizedRect>,
}

impl LocalAuthority {
    pub fn new(engine: Arc<Engine>, config: OmrConfig) -> Self {
        Self {
            engine,
            config,
            sensitivity: None,
            area: None,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    /// Sample inside an operator-drawn rectangle instead of detecting.
    pub fn with_manual_area(mut self, area: NormalizedRect) -> Self {
        self.area = Some(area);
        self
    }
}

impl AuthoritativeAnalyzer for LocalAuthority {
    fn reanalyze(&self, frame: &RgbaImage, question_order: &[u32]) -> Result<FrameAnalysis> {
        let mut request = AnalysisRequest::new(frame, question_order).with_config(self.config);
        request.sensitivity = self.sensitivity;
        request.area_override = self.area;

        let analysis = analyze_frame(&self.engine, &request)?;
        info!(
            questions = analysis.results.len(),
            detected = analysis.detected_count(),
            source = ?analysis.telemetry.area_source,
            "authoritative analysis complete"
        );
        Ok(analysis)
    }
}

impl<T: AuthoritativeAnalyzer + ?Sized> AuthoritativeAnalyzer for Box<T> {
    fn reanalyze(&self, frame: &RgbaImage, question_order: &[u32]) -> Result<FrameAnalysis> {
        (**self).reanalyze(frame, question_order)
    }
}
