//! Answer reading modules
//!
//! - Cell sampling (fill fraction of every bubble in the answer area)
//! - Statistical decision (frame-wide threshold, per-row verdicts)

/// Per-cell fill measurement
pub mod sampler;
/// Frame statistics and the precision-biased marking rule
pub mod decision;

pub use decision::{DecisionEngine, RowVerdict};
pub use sampler::CellSampler;
