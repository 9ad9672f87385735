use std::collections::BTreeMap;
use std::sync::Arc;

use image::RgbaImage;

use crate::models::FrameAnalysis;

/// Bookkeeping of one camera session.
#[derive(Debug, Clone, Default)]
pub struct LiveSession {
    /// Token carried by every analysis dispatched in this session.
    pub generation: u64,
    /// Set while a live analysis runs; new frames are dropped meanwhile.
    pub in_flight: bool,
    pub frames_seen: u64,
    pub last_frame: Option<Arc<RgbaImage>>,
    /// Most recent advisory result. Never submitted.
    pub preview: Option<FrameAnalysis>,
}

impl LiveSession {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }
}

/// Scanner lifecycle.
///
/// `Idle -> CameraStarting -> Live -> FrameCaptured -> Analyzed -> Submitted`,
/// with a reset back to `Idle` from anywhere. Every state carries exactly the
/// data it needs, so e.g. a submission without a captured frame cannot exist.
#[derive(Debug, Clone, Default)]
pub enum ScanState {
    #[default]
    Idle,
    CameraStarting,
    Live(LiveSession),
    FrameCaptured {
        frame: Arc<RgbaImage>,
    },
    Analyzed {
        frame: Arc<RgbaImage>,
        analysis: FrameAnalysis,
        /// Operator choices by question number.
        overrides: BTreeMap<u32, String>,
    },
    Submitted {
        frame: Arc<RgbaImage>,
        analysis: FrameAnalysis,
        answers: BTreeMap<u32, String>,
    },
}

impl ScanState {
    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::CameraStarting => "camera starting",
            ScanState::Live(_) => "live",
            ScanState::FrameCaptured { .. } => "frame captured",
            ScanState::Analyzed { .. } => "analyzed",
            ScanState::Submitted { .. } => "submitted",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ScanState::Live(_))
    }

    /// The frozen capture, once there is one.
    pub fn frame(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            ScanState::FrameCaptured { frame }
            | ScanState::Analyzed { frame, .. }
            | ScanState::Submitted { frame, .. } => Some(frame),
            _ => None,
        }
    }

    /// Authoritative analysis, once there is one.
    pub fn analysis(&self) -> Option<&FrameAnalysis> {
        match self {
            ScanState::Analyzed { analysis, .. } | ScanState::Submitted { analysis, .. } => {
                Some(analysis)
            }
            _ => None,
        }
    }
}

/// Where a final answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Override,
    Detected,
    Missing,
}

/// Merged answer of one question: operator override, else detection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FinalAnswer {
    pub ordem: u32,
    pub answer: Option<String>,
    pub source: AnswerSource,
}

/// Merge detections with overrides, in row order.
pub(crate) fn merge_answers(
    analysis: &FrameAnalysis,
    overrides: &BTreeMap<u32, String>,
) -> Vec<FinalAnswer> {
    analysis
        .results
        .iter()
        .map(|result| match (overrides.get(&result.ordem), &result.detected) {
            (Some(choice), _) => FinalAnswer {
                ordem: result.ordem,
                answer: Some(choice.clone()),
                source: AnswerSource::Override,
            },
            (None, Some(detected)) => FinalAnswer {
                ordem: result.ordem,
                answer: Some(detected.clone()),
                source: AnswerSource::Detected,
            },
            (None, None) => FinalAnswer {
                ordem: result.ordem,
                answer: None,
                source: AnswerSource::Missing,
            },
        })
        .collect()
}
