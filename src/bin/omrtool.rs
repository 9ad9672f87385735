use clap::{Args, Parser, Subcommand};
use rust_omr::controller::{LocalAuthority, ReplaySource, ScanController, TickOutcome};
use rust_omr::detector::{GridLocator, MarkerDetector, PerspectiveNormalizer};
use rust_omr::models::{NormalizedRect, letter_for_column};
use rust_omr::tools::synthetic::SyntheticSheet;
use rust_omr::tools::{dataset_iter, ink_stats, load_rgba, save_rgba};
use rust_omr::utils::binarization::adaptive_binarize_inv;
use rust_omr::utils::grayscale::blurred_grayscale;
use rust_omr::{Analyzer, FrameAnalysis, OmrConfig, OmrError, Result, shared_engine};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "omrtool", version, about = "RustOMR CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Common {
    /// JSON configuration (partial files fall back to defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of question rows, numbered from 1
    #[arg(long, default_value_t = 10)]
    rows: u32,
    /// Explicit question numbers, comma separated (overrides --rows)
    #[arg(long)]
    questions: Option<String>,
}

impl Common {
    fn config(&self) -> Result<OmrConfig> {
        match &self.config {
            Some(path) => OmrConfig::from_json_file(path),
            None => Ok(OmrConfig::default()),
        }
    }

    fn question_order(&self) -> Result<Vec<u32>> {
        match &self.questions {
            Some(list) => list
                .split(',')
                .map(|s| {
                    s.trim().parse::<u32>().map_err(|_| {
                        OmrError::invalid_input(format!("bad question number {s:?}"))
                    })
                })
                .collect(),
            None => Ok((1..=self.rows).collect()),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Read an answer sheet (or every image in a directory)
    Analyze {
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        common: Common,
        /// Threshold floor in [0, 1]
        #[arg(long)]
        sensitivity: Option<f64>,
        /// Manual answer area in percent: top,left,width,height
        #[arg(long)]
        area: Option<String>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the dark-region rectangle and fiducial candidates of an image
    Locate {
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        common: Common,
        #[arg(long)]
        json: bool,
    },
    /// Warp an image into the canonical layout and save it
    Normalize {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        common: Common,
    },
    /// Render a synthetic answer sheet
    Render {
        #[arg(long)]
        out: PathBuf,
        /// Answers per row: letters, or '-' for blank (e.g. "A,C,-,E")
        #[arg(long)]
        answers: String,
        #[arg(long, default_value_t = 4.0)]
        px_per_mm: f64,
        /// Pull the top corners in by this fraction of the width
        #[arg(long)]
        tilt: Option<f64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay an image as a camera: live preview, capture, authoritative read
    Scan {
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        common: Common,
        /// Live ticks before capturing
        #[arg(long, default_value_t = 10)]
        ticks: u32,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Analyze {
            image,
            common,
            sensitivity,
            area,
            json,
        } => analyze_cmd(&image, &common, sensitivity, area.as_deref(), json),
        Command::Locate {
            image,
            common,
            json,
        } => locate_cmd(&image, &common, json),
        Command::Normalize { image, out, common } => normalize_cmd(&image, &out, &common),
        Command::Render {
            out,
            answers,
            px_per_mm,
            tilt,
            config,
        } => render_cmd(&out, &answers, px_per_mm, tilt, config.as_deref()),
        Command::Scan {
            image,
            common,
            ticks,
        } => scan_cmd(&image, &common, ticks),
    };

    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(if err.is_fatal() { 2 } else { 1 });
    }
}

fn parse_area(text: &str) -> Result<NormalizedRect> {
    let values: Vec<f64> = text
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| OmrError::invalid_input(format!("bad area {text:?}")))?;
    match values.as_slice() {
        [top, left, width, height] => Ok(NormalizedRect::from_percent(*top, *left, *width, *height)),
        _ => Err(OmrError::invalid_input("area needs top,left,width,height")),
    }
}

fn analyze_cmd(
    image: &Path,
    common: &Common,
    sensitivity: Option<f64>,
    area: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut analyzer = Analyzer::new()?.with_config(common.config()?);
    if let Some(sensitivity) = sensitivity {
        analyzer = analyzer.with_sensitivity(sensitivity);
    }
    let area = area.map(parse_area).transpose()?;
    let order = common.question_order()?;

    let paths: Vec<PathBuf> = if image.is_dir() {
        dataset_iter(image, None).collect()
    } else {
        vec![image.to_path_buf()]
    };

    for path in paths {
        let frame = load_rgba(&path)?;
        let start = Instant::now();
        let analysis = match area {
            Some(area) => analyzer.analyze_area(&frame, &order, area)?,
            None => analyzer.analyze(&frame, &order)?,
        };
        let elapsed = start.elapsed();

        if json {
            let text = serde_json::to_string_pretty(&analysis)
                .map_err(|e| OmrError::json("serializing report", e))?;
            println!("{text}");
        } else {
            println!(
                "Image: {} ({}x{}) in {:.1} ms",
                path.display(),
                frame.width(),
                frame.height(),
                elapsed.as_secs_f64() * 1000.0
            );
            print_report(&analysis);
        }
    }
    Ok(())
}

fn print_report(analysis: &FrameAnalysis) {
    println!(
        "Area: top={:.3} left={:.3} width={:.3} height={:.3} ({:?}, {} markers)",
        analysis.area.top,
        analysis.area.left,
        analysis.area.width,
        analysis.area.height,
        analysis.telemetry.area_source,
        analysis.telemetry.markers_found
    );
    println!(
        "Stats: mean={:.3} stddev={:.3} threshold={:.3} samples={}",
        analysis.stats.mean, analysis.stats.stddev, analysis.stats.threshold, analysis.stats.samples
    );
    for result in &analysis.results {
        let scores: Vec<String> = result
            .scores
            .iter()
            .map(|s| format!("{}={:.2}", s.letter, s.percent))
            .collect();
        println!(
            "  Q{:>3}: {:<2} {:<9?} [{}]",
            result.ordem,
            result.detected.as_deref().unwrap_or("-"),
            result.status,
            scores.join(" ")
        );
    }
    println!(
        "Detected {}/{}; review: {:?}",
        analysis.detected_count(),
        analysis.results.len(),
        analysis.needs_review()
    );
}

fn locate_cmd(image: &Path, common: &Common, json: bool) -> Result<()> {
    let config = common.config()?;
    let frame = load_rgba(image)?;

    let rect = GridLocator::locate(&frame, &config.locator);
    let candidates = MarkerDetector::find_candidates(&frame, &config.markers);
    let blurred = blurred_grayscale(&frame, config.markers.blur_sigma);
    let ink = ink_stats(&adaptive_binarize_inv(
        &blurred,
        config.markers.block_size,
        config.markers.offset,
    ));

    if json {
        let centres: Vec<[f64; 3]> = candidates
            .iter()
            .map(|c| [c.center.x, c.center.y, c.size])
            .collect();
        let value = serde_json::json!({
            "width": frame.width(),
            "height": frame.height(),
            "located": rect,
            "markers": centres,
            "ink_ratio": ink.ink_ratio,
        });
        println!("{value}");
        return Ok(());
    }

    println!("Image: {} ({}x{})", image.display(), frame.width(), frame.height());
    println!(
        "Ink: {} of {} pixels ({:.2}%)",
        ink.ink_pixels,
        ink.total_pixels,
        ink.ink_ratio * 100.0
    );
    match rect {
        Some(r) => println!(
            "Located: top={:.3} left={:.3} width={:.3} height={:.3}",
            r.top, r.left, r.width, r.height
        ),
        None => println!("Located: none"),
    }
    println!("Fiducial candidates: {}", candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        println!(
            "  {}: center=({:.1}, {:.1}) size={:.1}",
            i, c.center.x, c.center.y, c.size
        );
    }
    Ok(())
}

fn normalize_cmd(image: &Path, out: &Path, common: &Common) -> Result<()> {
    let config = common.config()?;
    config.validate()?;
    let frame = load_rgba(image)?;
    let rows = common.question_order()?.len();

    let normalized = shared_engine().get()?.install(|| {
        PerspectiveNormalizer::normalize(&frame, rows, &config.grid, &config.markers)
    });
    let Some(normalized) = normalized else {
        return Err(OmrError::invalid_input(format!(
            "fewer than four usable fiducials in {}",
            image.display()
        )));
    };
    save_rgba(&normalized.image, out)?;
    println!(
        "Wrote {} ({}x{}), {} fiducial candidates",
        out.display(),
        normalized.image.width(),
        normalized.image.height(),
        normalized.markers_found
    );
    Ok(())
}

fn render_cmd(
    out: &Path,
    answers: &str,
    px_per_mm: f64,
    tilt: Option<f64>,
    config: Option<&Path>,
) -> Result<()> {
    let config = match config {
        Some(path) => OmrConfig::from_json_file(path)?,
        None => OmrConfig::default(),
    };
    let columns = config.grid.columns;

    let marks: Vec<Option<usize>> = answers
        .split(',')
        .map(|token| {
            let token = token.trim();
            if token == "-" || token.is_empty() {
                return Ok(None);
            }
            (0..columns)
                .find(|&c| letter_for_column(c).eq_ignore_ascii_case(token))
                .map(Some)
                .ok_or_else(|| OmrError::invalid_input(format!("unknown choice {token:?}")))
        })
        .collect::<Result<_>>()?;

    let mut sheet = SyntheticSheet::new(config.grid, marks.len())
        .with_answers(&marks)
        .with_resolution(px_per_mm);
    if let Some(fraction) = tilt {
        let corners = sheet.tilted_corners(fraction);
        sheet = sheet.with_keystone(corners);
    }
    let image = sheet.render();
    save_rgba(&image, out)?;
    println!(
        "Wrote {} ({}x{}, {} rows)",
        out.display(),
        image.width(),
        image.height(),
        marks.len()
    );
    Ok(())
}

fn scan_cmd(image: &Path, common: &Common, ticks: u32) -> Result<()> {
    let config = common.config()?;
    let order = common.question_order()?;
    let frame = load_rgba(image)?;
    let engine = shared_engine().get()?;

    let authority = LocalAuthority::new(engine.clone(), config);
    let source = Box::new(ReplaySource::new(vec![frame]));
    let mut controller = ScanController::new(source, authority, engine, order).with_config(config);

    controller.start_camera()?;
    for _ in 0..ticks {
        if controller.tick()? == TickOutcome::Dispatched {
            if let Some(preview) = controller.poll_blocking(Duration::from_millis(500)) {
                println!(
                    "Preview: {} of {} detected",
                    preview.detected_count(),
                    preview.results.len()
                );
            }
        }
    }
    let stats = controller.stats();
    println!(
        "Live: dispatched={} dropped={} discarded={}",
        stats.dispatched, stats.dropped, stats.discarded
    );

    controller.capture()?;
    let analysis = controller.analyze_capture()?.clone();
    print_report(&analysis);
    let pending = controller.pending_review()?;
    if pending.is_empty() {
        let answers = controller.submit()?;
        println!("Submitted {} answers", answers.len());
    } else {
        println!("Needs review before submission: {pending:?}");
    }
    Ok(())
}
