//! End-to-end behaviour of the analysis pipeline
//!
//! Decision-rule scenarios run on hand-made fill percentages; the rest run
//! the full pipeline on rendered answer sheets.

use image::{Rgba, RgbaImage};
use rust_omr::detector::{GridLocator, PerspectiveNormalizer};
use rust_omr::models::{CellScore, PixelRect, clamp01, letter_for_column};
use rust_omr::reader::{CellSampler, DecisionEngine};
use rust_omr::tools::synthetic::SyntheticSheet;
use rust_omr::{
    AnalysisRequest, AreaSource, Engine, GridConfig, LocatorConfig, MarkStatus, MarkerConfig,
    NormalizedRect, OmrConfig, analyze_frame,
};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn rows_from(percents: &[Vec<f64>]) -> Vec<Vec<CellScore>> {
    percents
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, &percent)| CellScore {
                    letter: letter_for_column(i),
                    percent,
                })
                .collect()
        })
        .collect()
}

fn one_hot(columns: &[usize], marked: f64, unmarked: f64) -> Vec<Vec<f64>> {
    columns
        .iter()
        .map(|&c| (0..5).map(|i| if i == c { marked } else { unmarked }).collect())
        .collect()
}

fn detected(results: &[rust_omr::QuestionResult]) -> Vec<Option<&str>> {
    results.iter().map(|r| r.detected.as_deref()).collect()
}

/// Deterministic pseudo-random bytes
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u8 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 24) as u8
    }
}

fn noise_image(width: u32, height: u32, seed: u64) -> RgbaImage {
    let mut rng = XorShift(seed);
    RgbaImage::from_fn(width, height, |_, _| {
        let v = rng.next();
        Rgba([v, v, v, 255])
    })
}

fn test_config() -> OmrConfig {
    let mut config = OmrConfig::default();
    // Smaller canonical image keeps the warp cheap in debug builds
    config.grid.px_per_mm = 5.0;
    config
}

#[test]
fn clean_marks_are_all_detected() {
    let columns = [0, 1, 2, 3, 4];
    let rows = rows_from(&one_hot(&columns, 1.0, 0.0));
    let (results, stats) = DecisionEngine::default().decide(&[1, 2, 3, 4, 5], rows, 0.0);

    assert_eq!(detected(&results), vec![Some("A"), Some("B"), Some("C"), Some("D"), Some("E")]);
    assert!(results.iter().all(|r| r.status == MarkStatus::Answered));
    assert_eq!(stats.samples, 25);
}

#[test]
fn tied_row_is_not_detected() {
    let mut percents = one_hot(&[0, 1, 2, 3], 1.0, 0.0);
    percents.push(vec![0.5, 0.5, 0.0, 0.0, 0.0]);
    let (results, _) = DecisionEngine::default().decide(&[1, 2, 3, 4, 5], rows_from(&percents), 0.0);

    assert_eq!(results[4].detected, None);
    assert_ne!(results[4].status, MarkStatus::Answered);
    assert_eq!(results[0].detected.as_deref(), Some("A"));
}

#[test]
fn blank_sheet_detects_nothing() {
    let percents = vec![vec![0.0; 5]; 5];
    let (results, stats) = DecisionEngine::default().decide(&[1, 2, 3, 4, 5], rows_from(&percents), 0.0);

    assert!(stats.threshold >= 0.12);
    assert_eq!(stats.mean, 0.0);
    assert!(results.iter().all(|r| r.detected.is_none()));
    assert!(results.iter().all(|r| r.status == MarkStatus::Blank));
}

#[test]
fn uniform_image_has_no_fiducials() {
    let image = RgbaImage::from_pixel(640, 800, Rgba([180, 180, 180, 255]));
    let result =
        PerspectiveNormalizer::normalize(&image, 10, &GridConfig::default(), &MarkerConfig::default());
    assert!(result.is_none());
}

#[test]
fn white_image_has_no_grid() {
    let image = RgbaImage::from_pixel(640, 800, WHITE);
    assert!(GridLocator::locate(&image, &LocatorConfig::default()).is_none());
}

#[test]
fn ten_question_reference_sheet() {
    let columns = [0, 2, 4, 1, 3, 0, 2, 4, 1, 3];
    let order: Vec<u32> = (1..=10).collect();
    let rows = rows_from(&one_hot(&columns, 0.95, 0.05));
    let (results, stats) = DecisionEngine::default().decide(&order, rows, 0.0);

    assert_eq!(results.len(), 10);
    let letters: Vec<&str> = results.iter().filter_map(|r| r.detected.as_deref()).collect();
    assert_eq!(letters, vec!["A", "C", "E", "B", "D", "A", "C", "E", "B", "D"]);
    assert_eq!(stats.samples, 50);
    assert_eq!(results.iter().map(|r| r.ordem).collect::<Vec<_>>(), order);
}

#[test]
fn percents_and_rects_stay_in_bounds() {
    let engine = Engine::build(2).expect("engine");
    let order: Vec<u32> = (1..=6).collect();
    for seed in [1u64, 7, 42] {
        let image = noise_image(240, 320, seed);

        if let Some(rect) = GridLocator::locate(&image, &LocatorConfig::default()) {
            assert!(rect.top >= 0.0 && rect.left >= 0.0);
            assert!(rect.top + rect.height <= 1.0 + 1e-12);
            assert!(rect.left + rect.width <= 1.0 + 1e-12);
        }

        let analysis = analyze_frame(&engine, &AnalysisRequest::new(&image, &order)).expect("analysis");
        let area = analysis.area;
        assert!(area.top + area.height <= 1.0 + 1e-12 && area.left + area.width <= 1.0 + 1e-12);
        for result in &analysis.results {
            for score in &result.scores {
                assert!((0.0..=1.0).contains(&score.percent));
            }
        }
        assert!((0.0..=1.0).contains(&analysis.stats.threshold));
    }
    assert_eq!(clamp01(f64::NAN), 0.0);
}

#[test]
fn sampling_cells_outside_the_image_is_clamped() {
    let image = RgbaImage::from_pixel(50, 40, WHITE);
    let sampler = CellSampler::new(20, 5, 0.18, 1.1);
    // Area hugging the bottom-right corner: cells degenerate to 4 px
    let rows = sampler.sample(&image, &NormalizedRect::new(0.95, 0.95, 0.05, 0.05));
    assert_eq!(rows.len(), 20);
    for row in &rows {
        assert_eq!(row.len(), 5);
        assert!(row.iter().all(|s| s.percent == 0.0));
    }
    let region = sampler.cell_region(PixelRect::new(47, 38, 2, 2), 19, 4);
    assert_eq!((region.width, region.height), (4, 4));
}

#[test]
fn sampling_and_decision_are_pure() {
    let grid = GridConfig::default();
    let sheet = SyntheticSheet::new(grid, 4).with_answers(&[Some(1), None, Some(3), Some(0)]);
    let image = sheet.render();
    let area = NormalizedRect::new(0.2, 0.3, 0.5, 0.5);
    let sampler = CellSampler::new(4, 5, grid.cell_padding, 1.1);
    let decision = DecisionEngine::default();

    let run = || {
        let scores = sampler.sample(&image, &area);
        decision.decide(&[1, 2, 3, 4], scores, 0.3)
    };
    let (first, first_stats) = run();
    let (second, second_stats) = run();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&(&first, &first_stats)).expect("json"),
        serde_json::to_vec(&(&second, &second_stats)).expect("json")
    );
}

#[test]
fn raising_a_cell_never_unmarks_it() {
    let decision = DecisionEngine::default();
    let background = [
        vec![0.1, 0.0, 0.2, 0.05, 0.0],
        vec![0.9, 0.1, 0.0, 0.0, 0.1],
        vec![0.0, 0.3, 0.85, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.95, 0.2],
    ];
    for column in 0..5 {
        let mut was_detected = false;
        for step in 0..=100 {
            let mut percents = background.to_vec();
            percents[0][column] = step as f64 / 100.0;
            let (results, _) = decision.decide(&[1, 2, 3, 4], rows_from(&percents), 0.0);
            let is_detected = results[0].detected.as_deref() == Some(letter_for_column(column).as_str());
            assert!(!was_detected || is_detected, "column {column} lost its mark at step {step}");
            was_detected = is_detected;
        }
        assert!(was_detected, "column {column} never became marked");
    }
}

#[test]
fn flat_sheet_is_read_through_the_fiducials() {
    let config = test_config();
    let answers: Vec<Option<usize>> = [0, 2, 4, 1, 3, 0, 2, 4, 1, 3].into_iter().map(Some).collect();
    let image = SyntheticSheet::new(config.grid, answers.len())
        .with_answers(&answers)
        .render();
    let order: Vec<u32> = (1..=10).collect();

    let engine = Engine::build(2).expect("engine");
    let request = AnalysisRequest::new(&image, &order).with_config(config);
    let analysis = analyze_frame(&engine, &request).expect("analysis");

    assert_eq!(analysis.telemetry.area_source, AreaSource::Canonical);
    assert!(analysis.telemetry.markers_found >= 4);
    assert_eq!(analysis.area, config.grid.answer_area(10));
    assert_eq!(
        analysis.detected_letters(),
        vec![Some("A"), Some("C"), Some("E"), Some("B"), Some("D"), Some("A"), Some("C"), Some("E"), Some("B"), Some("D")]
    );
    assert_eq!(analysis.stats.samples, 50);
    for result in &analysis.results {
        let top = result.scores.iter().map(|s| s.percent).fold(0.0, f64::max);
        assert!(top > 0.9, "question {} top score {top}", result.ordem);
    }
}

#[test]
fn tilted_sheet_is_corrected() {
    let config = test_config();
    let answers = [Some(4), Some(3), Some(2), Some(1), Some(0), Some(2)];
    let sheet = SyntheticSheet::new(config.grid, answers.len()).with_answers(&answers);
    let image = sheet.clone().with_keystone(sheet.tilted_corners(0.03)).render();
    let order = [11, 12, 13, 14, 15, 16];

    let engine = Engine::build(2).expect("engine");
    let request = AnalysisRequest::new(&image, &order).with_config(config);
    let analysis = analyze_frame(&engine, &request).expect("analysis");

    assert_eq!(analysis.telemetry.area_source, AreaSource::Canonical);
    assert_eq!(
        analysis.detected_letters(),
        vec![Some("E"), Some("D"), Some("C"), Some("B"), Some("A"), Some("C")]
    );
    assert_eq!(analysis.results[0].ordem, 11);
}

#[test]
fn blank_and_partial_rows_need_review() {
    let config = test_config();
    let sheet = SyntheticSheet::new(config.grid, 6)
        .with_answers(&[Some(0), None, Some(1), Some(2), Some(3), Some(4)])
        .with_mark(1, 2, 0.5);
    let image = sheet.render();
    let order: Vec<u32> = (1..=6).collect();

    let engine = Engine::build(2).expect("engine");
    let analysis =
        analyze_frame(&engine, &AnalysisRequest::new(&image, &order).with_config(config)).expect("analysis");

    assert_eq!(analysis.telemetry.area_source, AreaSource::Canonical);
    assert_eq!(analysis.results[1].detected, None);
    assert_ne!(analysis.results[1].status, MarkStatus::Answered);
    assert_eq!(analysis.needs_review(), vec![2]);
    assert_eq!(analysis.detected_count(), 5);
}

#[test]
fn sheet_without_fiducials_falls_back_to_locator() {
    let mut image = RgbaImage::from_pixel(500, 700, WHITE);
    // A dark block standing in for a printed grid, no fiducials
    for y in 300..600 {
        for x in 100..400 {
            if (x / 20 + y / 20) % 2 == 0 {
                image.put_pixel(x, y, Rgba([30, 30, 30, 255]));
            }
        }
    }
    let order = [1, 2, 3];
    let engine = Engine::build(1).expect("engine");
    let analysis = analyze_frame(&engine, &AnalysisRequest::new(&image, &order)).expect("analysis");

    assert_eq!(analysis.telemetry.area_source, AreaSource::Located);
    assert!(analysis.area.top > 0.35 && analysis.area.top < 0.45);
    assert_eq!(analysis.results.len(), 3);
}
