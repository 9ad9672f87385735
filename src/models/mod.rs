pub mod matrix;
pub mod point;
pub mod rect;
pub mod report;

pub use matrix::BitMatrix;
pub use point::Point;
pub use rect::{NormalizedRect, PixelRect, clamp01};
pub use report::{
    AnalysisStats, AreaSource, CellScore, FrameAnalysis, FrameTelemetry, MarkStatus,
    QuestionResult, letter_for_column,
};
