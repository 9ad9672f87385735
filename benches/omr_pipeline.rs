use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_omr::detector::PerspectiveNormalizer;
use rust_omr::reader::{CellSampler, DecisionEngine};
use rust_omr::tools::synthetic::SyntheticSheet;
use rust_omr::tools::{dataset_iter, dataset_root_from_env, load_rgba};
use rust_omr::{Analyzer, Engine, GridConfig, MarkerConfig};
use std::sync::Arc;

const ROWS: usize = 10;

fn answers() -> Vec<Option<usize>> {
    (0..ROWS).map(|i| Some((i * 2) % 5)).collect()
}

fn bench_synthetic_sheet(c: &mut Criterion) {
    let grid = GridConfig::default();
    let sheet = SyntheticSheet::new(grid, ROWS).with_answers(&answers());
    let flat = sheet.render();
    let tilted = sheet
        .clone()
        .with_keystone(sheet.tilted_corners(0.03))
        .render();

    let engine = Arc::new(Engine::build(0).expect("engine"));
    let analyzer = Analyzer::with_engine(engine);
    let order: Vec<u32> = (1..=ROWS as u32).collect();

    c.bench_function("analyze_flat_sheet", |b| {
        b.iter(|| analyzer.analyze(black_box(&flat), black_box(&order)))
    });
    c.bench_function("analyze_tilted_sheet", |b| {
        b.iter(|| analyzer.analyze(black_box(&tilted), black_box(&order)))
    });
    c.bench_function("normalize_tilted_sheet", |b| {
        b.iter(|| {
            PerspectiveNormalizer::normalize(
                black_box(&tilted),
                ROWS,
                &grid,
                &MarkerConfig::default(),
            )
        })
    });
}

fn bench_sample_and_decide(c: &mut Criterion) {
    let grid = GridConfig::default();
    let sheet = SyntheticSheet::new(grid, ROWS).with_answers(&answers());
    let Some(normalized) =
        PerspectiveNormalizer::normalize(&sheet.render(), ROWS, &grid, &MarkerConfig::default())
    else {
        return;
    };
    let sampler = CellSampler::new(ROWS, grid.columns, grid.cell_padding, 1.1);
    let decision = DecisionEngine::default();
    let order: Vec<u32> = (1..=ROWS as u32).collect();

    c.bench_function("sample_and_decide_canonical", |b| {
        b.iter(|| {
            let scores = sampler.sample(black_box(&normalized.image), &normalized.area);
            decision.decide(&order, scores, 0.0)
        })
    });
}

fn bench_dataset(c: &mut Criterion) {
    let Some(root) = dataset_root_from_env() else {
        return;
    };
    let frames: Vec<_> = dataset_iter(&root, Some(20))
        .filter_map(|path| load_rgba(path).ok())
        .collect();
    if frames.is_empty() {
        return;
    }
    let analyzer = match Analyzer::new() {
        Ok(analyzer) => analyzer,
        Err(_) => return,
    };
    let order: Vec<u32> = (1..=ROWS as u32).collect();

    c.bench_function("analyze_dataset", |b| {
        b.iter(|| {
            for frame in &frames {
                let _ = analyzer.analyze(black_box(frame), &order);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_synthetic_sheet,
    bench_sample_and_decide,
    bench_dataset
);
criterion_main!(benches);
