use super::rect::NormalizedRect;
use serde::{Deserialize, Serialize};

const LETTERS: [&str; 5] = ["A", "B", "C", "D", "E"];

/// Label for a zero-based choice column: A–E, then 1-based numbers.
pub fn letter_for_column(index: usize) -> String {
    LETTERS
        .get(index)
        .map(|s| (*s).to_string())
        .unwrap_or_else(|| (index + 1).to_string())
}

/// Fill measurement of one answer bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellScore {
    pub letter: String,
    /// Fraction of ink pixels in the sampled region, in [0, 1].
    pub percent: f64,
}

/// How confidently a row was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkStatus {
    /// A letter was detected.
    Answered,
    /// Something resembling a mark is present but the rule refused to pick;
    /// an operator must decide.
    Ambiguous,
    /// Nothing close to a mark.
    Blank,
}

/// Verdict for one question row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    /// Caller-supplied question sequence number.
    pub ordem: u32,
    pub detected: Option<String>,
    pub status: MarkStatus,
    /// One entry per column, in column order.
    pub scores: Vec<CellScore>,
}

impl QuestionResult {
    pub fn needs_review(&self) -> bool {
        self.detected.is_none()
    }
}

/// Population statistics over every cell of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub mean: f64,
    pub stddev: f64,
    pub threshold: f64,
    pub samples: usize,
}

/// Where the sampled rectangle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaSource {
    /// Perspective-corrected image, rectangle known analytically.
    Canonical,
    /// Raw frame, rectangle from the dark-region heuristic.
    Located,
    /// Raw frame, layout default rectangle.
    Default,
    /// Raw frame, rectangle supplied by the operator.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTelemetry {
    pub area_source: AreaSource,
    pub markers_found: usize,
}

impl Default for FrameTelemetry {
    fn default() -> Self {
        Self {
            area_source: AreaSource::Default,
            markers_found: 0,
        }
    }
}

/// Result of analyzing one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Rectangle that was sampled, relative to the working image.
    pub area: NormalizedRect,
    pub results: Vec<QuestionResult>,
    pub stats: AnalysisStats,
    pub telemetry: FrameTelemetry,
}

impl FrameAnalysis {
    pub fn detected_count(&self) -> usize {
        self.results.iter().filter(|r| r.detected.is_some()).count()
    }

    /// Question numbers that were not read confidently.
    pub fn needs_review(&self) -> Vec<u32> {
        self.results
            .iter()
            .filter(|r| r.needs_review())
            .map(|r| r.ordem)
            .collect()
    }

    /// Detected letters in row order.
    pub fn detected_letters(&self) -> Vec<Option<&str>> {
        self.results.iter().map(|r| r.detected.as_deref()).collect()
    }
}
