//! Answer-grid detection modules
//!
//! - Grid locator (cheap dark-region bounding box, used as a fallback)
//! - Fiducial marker search (contours, polygon approximation)
//! - Perspective normalization (homography into the canonical sheet layout)

/// Dark-region heuristic for the answer grid
pub mod locator;
/// Square fiducial candidate search
pub mod markers;
/// Four-corner homography and canonical warp
pub mod normalizer;

pub use locator::GridLocator;
pub use markers::{MarkerCandidate, MarkerDetector};
pub use normalizer::{Normalized, PerspectiveNormalizer};
