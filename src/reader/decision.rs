use crate::config::DecisionConfig;
use crate::models::{AnalysisStats, CellScore, MarkStatus, QuestionResult, clamp01};

/// Verdict for one row before it is tagged with its question number
#[derive(Debug, Clone, PartialEq)]
pub struct RowVerdict {
    pub detected: Option<String>,
    pub status: MarkStatus,
}

/// Frame-wide statistics and the marking rule.
///
/// A letter is only reported when its cell is both clearly filled (above a
/// hard floor and the frame's adaptive threshold) and clearly ahead of the
/// runner-up in its row. Everything else is left for an operator.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Mean, population standard deviation and adaptive threshold over every
    /// cell. `sensitivity` is a caller floor for the threshold.
    pub fn statistics(&self, percents: &[f64], sensitivity: f64) -> AnalysisStats {
        let divisor = percents.len().max(1) as f64;
        let mean = percents.iter().sum::<f64>() / divisor;
        let variance = percents.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / divisor;
        let stddev = variance.sqrt();

        let spread = (stddev * self.config.spread_stddev_factor).max(self.config.spread_floor);
        let threshold = clamp01((mean + spread).max(clamp01(sensitivity)));

        AnalysisStats {
            mean,
            stddev,
            threshold,
            samples: percents.len(),
        }
    }

    /// Judge one row against frame statistics
    pub fn judge_row(&self, scores: &[CellScore], stats: &AnalysisStats) -> RowVerdict {
        let mut sorted: Vec<&CellScore> = scores.iter().collect();
        // Stable: equal scores keep column order
        sorted.sort_by(|a, b| b.percent.total_cmp(&a.percent));

        let Some(top) = sorted.first() else {
            return RowVerdict {
                detected: None,
                status: MarkStatus::Blank,
            };
        };

        let marked = top.percent >= self.config.marked_floor.max(stats.threshold);
        let min_gap = self
            .config
            .gap_floor
            .max(stats.stddev * self.config.gap_stddev_factor);
        let gap_ok = sorted
            .get(1)
            .is_none_or(|runner_up| top.percent - runner_up.percent >= min_gap);

        if marked && gap_ok {
            return RowVerdict {
                detected: Some(top.letter.clone()),
                status: MarkStatus::Answered,
            };
        }

        let status = if top.percent >= self.config.soft_floor || top.percent >= stats.threshold {
            MarkStatus::Ambiguous
        } else {
            MarkStatus::Blank
        };
        RowVerdict {
            detected: None,
            status,
        }
    }

    /// Statistics plus one result per row. Rows are paired with
    /// `question_order` by position; extra rows are numbered from 1.
    pub fn decide(
        &self,
        question_order: &[u32],
        rows: Vec<Vec<CellScore>>,
        sensitivity: f64,
    ) -> (Vec<QuestionResult>, AnalysisStats) {
        let rows: Vec<Vec<CellScore>> = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|mut score| {
                        score.percent = clamp01(score.percent);
                        score
                    })
                    .collect()
            })
            .collect();
        let percents: Vec<f64> = rows
            .iter()
            .flat_map(|row| row.iter().map(|s| s.percent))
            .collect();
        let stats = self.statistics(&percents, sensitivity);

        let results = rows
            .into_iter()
            .enumerate()
            .map(|(index, scores)| {
                let verdict = self.judge_row(&scores, &stats);
                QuestionResult {
                    ordem: question_order
                        .get(index)
                        .copied()
                        .unwrap_or(index as u32 + 1),
                    detected: verdict.detected,
                    status: verdict.status,
                    scores,
                }
            })
            .collect();

        (results, stats)
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::letter_for_column;

    fn row(percents: &[f64]) -> Vec<CellScore> {
        percents
            .iter()
            .enumerate()
            .map(|(i, &percent)| CellScore {
                letter: letter_for_column(i),
                percent,
            })
            .collect()
    }

    #[test]
    fn test_statistics() {
        let engine = DecisionEngine::default();
        let stats = engine.statistics(&[0.0, 1.0, 0.0, 1.0], 0.0);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert!((stats.stddev - 0.5).abs() < 1e-12);
        assert!((stats.threshold - 0.875).abs() < 1e-12);
        assert_eq!(stats.samples, 4);

        let empty = engine.statistics(&[], 0.0);
        assert_eq!(empty.samples, 0);
        assert!((empty.threshold - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_sensitivity_raises_threshold() {
        let engine = DecisionEngine::default();
        let stats = engine.statistics(&[0.0; 10], 0.6);
        assert!((stats.threshold - 0.6).abs() < 1e-12);
        let stats = engine.statistics(&[0.0; 10], 7.0);
        assert_eq!(stats.threshold, 1.0);
    }

    #[test]
    fn test_partial_fill_is_ambiguous_not_guessed() {
        let engine = DecisionEngine::default();
        let rows = vec![row(&[0.75, 0.0, 0.0, 0.0, 0.0]), row(&[0.0; 5])];
        let (results, _) = engine.decide(&[1, 2], rows, 0.0);
        assert_eq!(results[0].detected, None);
        assert_eq!(results[0].status, MarkStatus::Ambiguous);
        assert_eq!(results[1].status, MarkStatus::Blank);
    }

    #[test]
    fn test_close_runner_up_blocks_detection() {
        let engine = DecisionEngine::default();
        let rows = vec![row(&[0.95, 0.9, 0.0, 0.0, 0.0])];
        let (results, _) = engine.decide(&[5], rows, 0.0);
        assert_eq!(results[0].ordem, 5);
        assert_eq!(results[0].detected, None);
        assert_eq!(results[0].status, MarkStatus::Ambiguous);
    }

    #[test]
    fn test_nan_scores_count_as_empty() {
        let engine = DecisionEngine::default();
        let rows = vec![row(&[f64::NAN, 1.0, 0.0]), row(&[0.0, 0.0, 1.0])];
        let (results, stats) = engine.decide(&[1, 2], rows, 0.0);
        assert_eq!(results[0].scores[0].percent, 0.0);
        assert_eq!(results[0].detected.as_deref(), Some("B"));
        assert!(stats.mean.is_finite());
    }

    #[test]
    fn test_missing_question_numbers_default_to_position() {
        let engine = DecisionEngine::default();
        let rows = vec![row(&[1.0, 0.0]), row(&[0.0, 1.0])];
        let (results, _) = engine.decide(&[9], rows, 0.0);
        assert_eq!(results[0].ordem, 9);
        assert_eq!(results[1].ordem, 2);
        assert_eq!(results[1].detected.as_deref(), Some("B"));
    }
}
