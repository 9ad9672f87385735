//! RustOMR - optical mark recognition for printed answer sheets
//!
//! Reads a photo (or live camera frame) of a multiple-choice answer sheet
//! and reports, per question, which bubble was filled together with the
//! frame-wide fill statistics the verdicts were derived from.
//!
//! Pipeline, in fixed order:
//! 1. Four square fiducials are searched and the sheet is warped into its
//!    canonical, physically known layout. If that fails a cheap dark-region
//!    locator (or the layout default) picks the area on the raw frame.
//! 2. Every bubble of the answer area is scored by its fraction of ink.
//! 3. A precision-biased rule turns scores into letters, leaving anything
//!    doubtful for an operator.
//!
//! [`controller::ScanController`] wraps this in a live-preview / capture /
//! review / submit state machine.

/// Layout constants, tuning and environment knobs
pub mod config;
/// Frame loop state machine
pub mod controller;
/// Answer-grid detection (locator, fiducials, perspective)
pub mod detector;
/// Worker pool with single-flight initialization
pub mod engine;
/// Error type
pub mod error;
/// Core data structures (rects, points, bit matrix, reports)
pub mod models;
/// Fixed-order single-frame analysis
pub mod pipeline;
/// Cell sampling and the decision rule
pub mod reader;
/// Image I/O, dataset listing and synthetic sheets
pub mod tools;
/// Utility functions (grayscale, binarization, geometry, warping)
pub mod utils;

pub use config::{DecisionConfig, GridConfig, LocatorConfig, MarkerConfig, OmrConfig};
pub use engine::{Engine, EngineCell, shared_engine};
pub use error::{OmrError, Result};
pub use models::{
    AnalysisStats, AreaSource, CellScore, FrameAnalysis, MarkStatus, NormalizedRect, Point,
    QuestionResult,
};
pub use pipeline::{AnalysisRequest, analyze_frame};

use image::RgbaImage;
use std::sync::Arc;

/// Analyze one sheet image with the default layout on the shared engine.
///
/// `question_order` lists the question numbers printed on the rows, top to
/// bottom; its length is the row count.
pub fn analyze(image: &RgbaImage, question_order: &[u32]) -> Result<FrameAnalysis> {
    Analyzer::new()?.analyze(image, question_order)
}

/// Reusable analyzer bound to an engine and a configuration
#[derive(Debug, Clone)]
pub struct Analyzer {
    engine: Arc<Engine>,
    config: OmrConfig,
    sensitivity: Option<f64>,
}

impl Analyzer {
    /// Analyzer on the process-wide engine with default configuration
    pub fn new() -> Result<Self> {
        Ok(Self::with_engine(shared_engine().get()?))
    }

    pub fn with_engine(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            config: OmrConfig::default(),
            sensitivity: None,
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

    pub fn config(&self) -> &OmrConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Detect the answer area and read it
    pub fn analyze(&self, image: &RgbaImage, question_order: &[u32]) -> Result<FrameAnalysis> {
        analyze_frame(&self.engine, &self.request(image, question_order))
    }

    /// Read inside an operator-chosen rectangle of the raw image
    pub fn analyze_area(
        &self,
        image: &RgbaImage,
        question_order: &[u32],
        area: NormalizedRect,
    ) -> Result<FrameAnalysis> {
        analyze_frame(
            &self.engine,
            &self.request(image, question_order).with_area(area),
        )
    }

    fn request<'a>(&self, image: &'a RgbaImage, question_order: &'a [u32]) -> AnalysisRequest<'a> {
        let mut request = AnalysisRequest::new(image, question_order).with_config(self.config);
        request.sensitivity = self.sensitivity;
        request
    }
}
