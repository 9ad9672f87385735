//! Layout constants, decision tuning and runtime knobs.
//!
//! `GridConfig` is a hard contract with the printed sheet: nothing in it is
//! inferred from pixels. The remaining structs hold empirically chosen
//! thresholds, kept configurable rather than re-derived.

use crate::error::{OmrError, Result};
use crate::models::NormalizedRect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Margins around the answer grid, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddingMm {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for PaddingMm {
    fn default() -> Self {
        Self {
            top: 20.0,
            bottom: 20.0,
            left: 22.0,
            right: 22.0,
        }
    }
}

/// Physical layout of the printed answer sheet.
///
/// The grid is one label column (question numbers) followed by `columns`
/// choice columns, `rows` rows of `row_height_mm` each, surrounded by
/// `padding_mm`. The row count always comes from the question order of the
/// call, so it is a parameter of the derived quantities rather than a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of answer choices per question.
    pub columns: usize,
    /// Printed question-number column left of the choices, excluded from the
    /// answer area. Set to 0 (with `choice_column_mm` widened to keep the
    /// inner width) for a sheet whose answer area spans the full inner grid.
    pub label_column_mm: f64,
    pub choice_column_mm: f64,
    pub padding_mm: PaddingMm,
    pub row_height_mm: f64,
    /// Side length of each square fiducial.
    pub marker_size_mm: f64,
    /// Distance from a fiducial's outer edge to the canonical frame corner.
    pub marker_offset_mm: f64,
    /// Resolution of the canonical (warped) image.
    pub px_per_mm: f64,
    /// Fraction of each cell trimmed off (half per side) before sampling.
    pub cell_padding: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 5,
            label_column_mm: 22.0,
            choice_column_mm: 14.0,
            padding_mm: PaddingMm::default(),
            row_height_mm: 11.0,
            marker_size_mm: 14.0,
            marker_offset_mm: 12.0,
            px_per_mm: 10.0,
            cell_padding: 0.18,
        }
    }
}

impl GridConfig {
    /// Width of the printed grid including the label column.
    pub fn inner_width_mm(&self) -> f64 {
        self.label_column_mm + self.choice_column_mm * self.columns as f64
    }

    pub fn total_width_mm(&self) -> f64 {
        self.inner_width_mm() + self.padding_mm.left + self.padding_mm.right
    }

    pub fn total_height_mm(&self, rows: usize) -> f64 {
        self.padding_mm.top + self.padding_mm.bottom + self.row_height_mm * rows as f64
    }

    /// Pixel size of the canonical image for `rows` questions.
    pub fn canonical_size(&self, rows: usize) -> (u32, u32) {
        let width = (self.total_width_mm() * self.px_per_mm).round().max(1.0);
        let height = (self.total_height_mm(rows) * self.px_per_mm).round().max(1.0);
        (width as u32, height as u32)
    }

    /// Distance from a fiducial centroid to the canonical frame corner it anchors.
    pub fn marker_inset_mm(&self) -> f64 {
        self.marker_offset_mm - self.marker_size_mm / 2.0
    }

    /// Exact answer-cell rectangle inside the canonical image.
    ///
    /// Covers only the choice columns; the label column is skipped.
    pub fn answer_area(&self, rows: usize) -> NormalizedRect {
        let rows = rows.max(1);
        let total_width = self.total_width_mm();
        let total_height = self.total_height_mm(rows);
        NormalizedRect::new(
            self.padding_mm.top / total_height,
            (self.padding_mm.left + self.label_column_mm) / total_width,
            self.choice_column_mm * self.columns as f64 / total_width,
            self.row_height_mm * rows as f64 / total_height,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 {
            return Err(OmrError::invalid_input("grid must have at least one column"));
        }
        let lengths = [
            ("choice_column_mm", self.choice_column_mm),
            ("row_height_mm", self.row_height_mm),
            ("marker_size_mm", self.marker_size_mm),
            ("px_per_mm", self.px_per_mm),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value <= 0.0 {
                return Err(OmrError::invalid_input(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let margins = [
            ("label_column_mm", self.label_column_mm),
            ("marker_offset_mm", self.marker_offset_mm),
            ("padding_mm.top", self.padding_mm.top),
            ("padding_mm.bottom", self.padding_mm.bottom),
            ("padding_mm.left", self.padding_mm.left),
            ("padding_mm.right", self.padding_mm.right),
        ];
        for (name, value) in margins {
            if !value.is_finite() || value < 0.0 {
                return Err(OmrError::invalid_input(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.cell_padding) {
            return Err(OmrError::invalid_input(format!(
                "cell_padding must be in [0, 1), got {}",
                self.cell_padding
            )));
        }
        Ok(())
    }
}

/// Thresholds of the statistical decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Hard floor a top score must reach to count as marked.
    pub marked_floor: f64,
    /// Scores at or above this but not detected are reported as ambiguous.
    pub soft_floor: f64,
    /// Minimum top-to-runner-up gap.
    pub gap_floor: f64,
    pub gap_stddev_factor: f64,
    /// Minimum distance of the adaptive threshold above the mean.
    pub spread_floor: f64,
    pub spread_stddev_factor: f64,
    /// Caller-supplied floor for the adaptive threshold, in [0, 1].
    pub sensitivity: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            marked_floor: 0.8,
            soft_floor: 0.72,
            gap_floor: 0.07,
            gap_stddev_factor: 0.25,
            spread_floor: 0.12,
            spread_stddev_factor: 0.75,
            sensitivity: 0.0,
        }
    }
}

/// Grid Locator sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Fraction of the height skipped at the top (header text).
    pub top_margin: f64,
    /// Fraction of the width skipped on each side.
    pub side_margin: f64,
    /// Luma (0..1) below which a sample counts as dark.
    pub luma_cutoff: f64,
    /// Fractional growth of the dark bounding box on each axis.
    pub expand: f64,
    pub stride_divisor: u32,
    pub min_stride: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            top_margin: 0.18,
            side_margin: 0.04,
            luma_cutoff: 0.7,
            expand: 0.05,
            stride_divisor: 220,
            min_stride: 4,
        }
    }
}

/// Fiducial search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Gaussian sigma, equivalent to a 5x5 kernel.
    pub blur_sigma: f32,
    /// Adaptive threshold window (odd, pixels).
    pub block_size: u32,
    /// Constant subtracted from the local mean.
    pub offset: i32,
    /// Minimum polygon area as a fraction of the image area.
    pub min_area_fraction: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub approx_epsilon: f64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            block_size: 35,
            offset: 12,
            min_area_fraction: 0.005,
            min_aspect: 0.75,
            max_aspect: 1.25,
            approx_epsilon: 0.02,
        }
    }
}

/// Everything one analysis call needs besides the image and question order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OmrConfig {
    pub grid: GridConfig,
    pub decision: DecisionConfig,
    pub locator: LocatorConfig,
    pub markers: MarkerConfig,
}

impl OmrConfig {
    /// Load a (possibly partial) configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OmrError::io("reading config", e))?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| OmrError::json("parsing config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if self.markers.blur_sigma.is_nan() || self.markers.blur_sigma <= 0.0 {
            return Err(OmrError::invalid_input("markers.blur_sigma must be positive"));
        }
        if self.markers.block_size < 3 {
            return Err(OmrError::invalid_input("markers.block_size must be at least 3"));
        }
        if self.locator.stride_divisor == 0 {
            return Err(OmrError::invalid_input("locator.stride_divisor must be positive"));
        }
        Ok(())
    }
}

fn parse_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

static ENGINE_THREADS: OnceLock<usize> = OnceLock::new();

/// Worker threads for the shared engine; 0 lets rayon decide.
pub(crate) fn engine_threads() -> usize {
    *ENGINE_THREADS.get_or_init(|| parse_env_usize("OMR_ENGINE_THREADS", 0))
}

static ENGINE_TIMEOUT_MS: OnceLock<u64> = OnceLock::new();

/// How long a caller waits on an engine load started by someone else.
pub(crate) fn engine_timeout_ms() -> u64 {
    *ENGINE_TIMEOUT_MS.get_or_init(|| parse_env_u64("OMR_ENGINE_TIMEOUT_MS", 30_000).max(1))
}

static MAX_DIM: OnceLock<Option<u32>> = OnceLock::new();

/// Longest image side accepted by `tools::load_rgba` before downscaling.
pub(crate) fn max_dim() -> Option<u32> {
    *MAX_DIM.get_or_init(|| match parse_env_u64("OMR_MAX_DIM", 0) {
        0 => None,
        v => Some(v.min(u32::MAX as u64) as u32),
    })
}
