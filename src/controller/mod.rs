//! Frame loop controller
//!
//! Drives a capture device through live preview, one-shot capture,
//! authoritative analysis, operator review and submission.
//!
//! The host calls [`ScanController::tick`] from its frame-paced callback.
//! Each tick grabs a frame and, unless a live analysis is already running,
//! hands it to the engine pool; frames arriving meanwhile are dropped.
//! Finished previews come back through [`ScanController::poll`], which
//! discards any result belonging to a session that has since been stopped.

pub mod authority;
pub mod source;
pub mod state;

pub use authority::{AuthoritativeAnalyzer, LocalAuthority};
pub use source::{FrameSource, ReplaySource};
pub use state::{AnswerSource, FinalAnswer, LiveSession, ScanState};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::OmrConfig;
use crate::engine::Engine;
use crate::error::{OmrError, Result};
use crate::models::{AreaSource, FrameAnalysis, NormalizedRect};
use crate::pipeline::{AnalysisRequest, analyze_frame};

/// Threshold floor for live previews, stricter than the default.
pub const LIVE_SENSITIVITY: f64 = 0.6;

/// What one [`ScanController::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame sent to the engine for a live analysis.
    Dispatched,
    /// Frame discarded because an analysis is still running.
    Dropped,
    /// The device had no frame.
    NoFrame,
    /// Camera is not live.
    Inactive,
}

/// Live-loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub dispatched: u64,
    pub dropped: u64,
    /// Results that arrived after their session was cancelled.
    pub discarded: u64,
    pub applied: u64,
    pub failed: u64,
}

struct LiveResult {
    generation: u64,
    result: Result<FrameAnalysis>,
}

pub struct ScanController<A: AuthoritativeAnalyzer> {
    source: Box<dyn FrameSource>,
    authority: A,
    engine: Arc<Engine>,
    config: OmrConfig,
    question_order: Arc<[u32]>,
    live_sensitivity: f64,
    state: ScanState,
    generation: u64,
    results_tx: Sender<LiveResult>,
    results_rx: Receiver<LiveResult>,
    area_hint: Option<NormalizedRect>,
    stats: ControllerStats,
}

impl<A: AuthoritativeAnalyzer> ScanController<A> {
    pub fn new(
        source: Box<dyn FrameSource>,
        authority: A,
        engine: Arc<Engine>,
        question_order: Vec<u32>,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            source,
            authority,
            engine,
            config: OmrConfig::default(),
            question_order: question_order.into(),
            live_sensitivity: LIVE_SENSITIVITY,
            state: ScanState::Idle,
            generation: 0,
            results_tx,
            results_rx,
            area_hint: None,
            stats: ControllerStats::default(),
        }
    }

    /// Layout and tuning used for live previews.
    pub fn with_config(mut self, config: OmrConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_live_sensitivity(mut self, sensitivity: f64) -> Self {
        self.live_sensitivity = sensitivity;
        self
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn question_order(&self) -> &[u32] {
        &self.question_order
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Last rectangle the live locator found on a raw frame. A UI seed for
    /// manual area selection, never used as geometry.
    pub fn area_hint(&self) -> Option<NormalizedRect> {
        self.area_hint
    }

    /// Most recent advisory live result.
    pub fn preview(&self) -> Option<&FrameAnalysis> {
        match &self.state {
            ScanState::Live(session) => session.preview.as_ref(),
            _ => None,
        }
    }

    /// Acquire the device and enter live preview.
    ///
    /// Allowed when idle and as a retake from a captured or analyzed frame.
    pub fn start_camera(&mut self) -> Result<()> {
        match self.state {
            ScanState::Idle | ScanState::FrameCaptured { .. } | ScanState::Analyzed { .. } => {}
            ref other => return Err(OmrError::transition("start the camera", other.name())),
        }

        self.state = ScanState::CameraStarting;
        if let Err(err) = self.source.start() {
            warn!(error = %err, "capture device unavailable");
            self.source.stop();
            self.state = ScanState::Idle;
            return Err(err);
        }

        self.generation += 1;
        self.state = ScanState::Live(LiveSession::new(self.generation));
        debug!(generation = self.generation, "camera live");
        Ok(())
    }

    /// One iteration of the frame-paced loop.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let ScanState::Live(session) = &mut self.state else {
            return Ok(TickOutcome::Inactive);
        };

        let Some(frame) = self.source.grab()? else {
            return Ok(TickOutcome::NoFrame);
        };
        let frame = Arc::new(frame);
        session.frames_seen += 1;
        session.last_frame = Some(Arc::clone(&frame));

        if session.in_flight {
            self.stats.dropped += 1;
            return Ok(TickOutcome::Dropped);
        }
        session.in_flight = true;
        self.stats.dispatched += 1;

        let generation = session.generation;
        let worker = Arc::clone(&self.engine);
        let order = Arc::clone(&self.question_order);
        let tx = self.results_tx.clone();
        let config = self.config;
        let sensitivity = self.live_sensitivity;

        self.engine.spawn(move || {
            let request = AnalysisRequest::new(&frame, &order)
                .with_config(config)
                .with_sensitivity(sensitivity);
            let result = analyze_frame(&worker, &request);
            // Receiver gone means the controller was dropped
            let _ = tx.send(LiveResult { generation, result });
        });

        Ok(TickOutcome::Dispatched)
    }

    /// Apply finished live analyses without waiting. Returns the current
    /// preview if any result was applied.
    pub fn poll(&mut self) -> Option<&FrameAnalysis> {
        let mut applied = false;
        while let Ok(message) = self.results_rx.try_recv() {
            applied |= self.apply(message);
        }
        if applied { self.preview() } else { None }
    }

    /// Like [`ScanController::poll`], waiting up to `timeout` for a result.
    pub fn poll_blocking(&mut self, timeout: Duration) -> Option<&FrameAnalysis> {
        let mut applied = match self.results_rx.recv_timeout(timeout) {
            Ok(message) => self.apply(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        };
        while let Ok(message) = self.results_rx.try_recv() {
            applied |= self.apply(message);
        }
        if applied { self.preview() } else { None }
    }

    fn apply(&mut self, message: LiveResult) -> bool {
        let session = match &mut self.state {
            ScanState::Live(session) if session.generation == message.generation => session,
            _ => {
                self.stats.discarded += 1;
                debug!(generation = message.generation, "discarding cancelled live result");
                return false;
            }
        };
        session.in_flight = false;

        match message.result {
            Ok(analysis) => {
                if analysis.telemetry.area_source == AreaSource::Located {
                    self.area_hint = Some(analysis.area);
                }
                session.preview = Some(analysis);
                self.stats.applied += 1;
                true
            }
            Err(err) => {
                warn!(error = %err, "live analysis failed");
                self.stats.failed += 1;
                false
            }
        }
    }

    /// Release the device and cancel any live analysis. Safe from any state;
    /// only a live or starting session changes state (back to idle).
    pub fn stop_camera(&mut self) {
        self.source.stop();
        self.generation += 1;
        if matches!(self.state, ScanState::Live(_) | ScanState::CameraStarting) {
            self.state = ScanState::Idle;
        }
    }

    /// Freeze the current frame and release the device.
    ///
    /// Falls back to the last live frame only when the device has nothing
    /// new; a device error is returned and the session stays live.
    pub fn capture(&mut self) -> Result<()> {
        let state_name = self.state.name();
        let ScanState::Live(session) = &mut self.state else {
            return Err(OmrError::transition("capture", state_name));
        };

        let frame = match self.source.grab() {
            Ok(Some(frame)) => Arc::new(frame),
            Ok(None) => session
                .last_frame
                .take()
                .ok_or_else(|| OmrError::acquisition("no frame available to capture"))?,
            Err(err) => {
                warn!(error = %err, "capture device failed during capture");
                return Err(err);
            }
        };

        self.source.stop();
        self.generation += 1;
        self.state = ScanState::FrameCaptured { frame };
        Ok(())
    }

    /// Use an uploaded photo instead of the camera.
    pub fn load_frame(&mut self, frame: RgbaImage) -> Result<()> {
        match self.state {
            ScanState::Idle | ScanState::FrameCaptured { .. } | ScanState::Analyzed { .. } => {}
            ref other => return Err(OmrError::transition("load a frame", other.name())),
        }
        self.state = ScanState::FrameCaptured {
            frame: Arc::new(frame),
        };
        Ok(())
    }

    /// Run the authoritative analysis on the captured frame. Re-running from
    /// `Analyzed` clears previous overrides.
    pub fn analyze_capture(&mut self) -> Result<&FrameAnalysis> {
        let frame = match &self.state {
            ScanState::FrameCaptured { frame } | ScanState::Analyzed { frame, .. } => {
                Arc::clone(frame)
            }
            other => return Err(OmrError::transition("analyze", other.name())),
        };

        let analysis = self.authority.reanalyze(&frame, &self.question_order)?;
        self.state = ScanState::Analyzed {
            frame,
            analysis,
            overrides: BTreeMap::new(),
        };
        self.state
            .analysis()
            .ok_or_else(|| OmrError::transition("analyze", "captured"))
    }

    /// Operator choice for one question. Choosing the current override again
    /// clears it. Returns the question's merged answer afterwards.
    pub fn set_override(&mut self, ordem: u32, letter: &str) -> Result<Option<String>> {
        let state_name = self.state.name();
        let ScanState::Analyzed {
            analysis,
            overrides,
            ..
        } = &mut self.state
        else {
            return Err(OmrError::transition("override an answer", state_name));
        };

        let Some(result) = analysis.results.iter().find(|r| r.ordem == ordem) else {
            return Err(OmrError::invalid_input(format!("question {ordem} is not on this sheet")));
        };
        if !result.scores.iter().any(|s| s.letter == letter) {
            return Err(OmrError::invalid_input(format!(
                "{letter} is not a choice of question {ordem}"
            )));
        }

        if overrides.get(&ordem).is_some_and(|current| current == letter) {
            overrides.remove(&ordem);
        } else {
            overrides.insert(ordem, letter.to_string());
        }

        Ok(overrides
            .get(&ordem)
            .cloned()
            .or_else(|| result.detected.clone()))
    }

    /// Merged answers in row order.
    pub fn final_answers(&self) -> Result<Vec<FinalAnswer>> {
        match &self.state {
            ScanState::Analyzed {
                analysis,
                overrides,
                ..
            } => Ok(state::merge_answers(analysis, overrides)),
            ScanState::Submitted { analysis, answers, .. } => Ok(analysis
                .results
                .iter()
                .map(|result| {
                    let answer = answers.get(&result.ordem).cloned();
                    let source = match (&answer, &result.detected) {
                        (None, _) => AnswerSource::Missing,
                        (Some(a), Some(d)) if a == d => AnswerSource::Detected,
                        (Some(_), _) => AnswerSource::Override,
                    };
                    FinalAnswer {
                        ordem: result.ordem,
                        answer,
                        source,
                    }
                })
                .collect()),
            other => Err(OmrError::transition("list answers", other.name())),
        }
    }

    /// Questions that still have neither a detection nor an override.
    pub fn pending_review(&self) -> Result<Vec<u32>> {
        Ok(self
            .final_answers()?
            .into_iter()
            .filter(|a| a.answer.is_none())
            .map(|a| a.ordem)
            .collect())
    }

    /// Freeze the merged answers. Every question must have one.
    pub fn submit(&mut self) -> Result<&BTreeMap<u32, String>> {
        if !matches!(self.state, ScanState::Analyzed { .. }) {
            return Err(OmrError::transition("submit", self.state.name()));
        }
        let pending = self.pending_review()?;
        if !pending.is_empty() {
            let list: Vec<String> = pending.iter().map(u32::to_string).collect();
            return Err(OmrError::invalid_input(format!(
                "questions {} still need an answer",
                list.join(", ")
            )));
        }

        let answers: BTreeMap<u32, String> = self
            .final_answers()?
            .into_iter()
            .filter_map(|a| a.answer.map(|letter| (a.ordem, letter)))
            .collect();

        let ScanState::Analyzed {
            frame, analysis, ..
        } = std::mem::take(&mut self.state)
        else {
            return Err(OmrError::transition("submit", "analyzed"));
        };
        self.state = ScanState::Submitted {
            frame,
            analysis,
            answers,
        };
        match &self.state {
            ScanState::Submitted { answers, .. } => Ok(answers),
            other => Err(OmrError::transition("submit", other.name())),
        }
    }

    /// Back to idle from anywhere, releasing the device.
    pub fn reset(&mut self) {
        self.source.stop();
        self.generation += 1;
        self.state = ScanState::Idle;
    }

    /// Swap the capture device. The old one is released first; a live
    /// session ends.
    pub fn replace_source(&mut self, source: Box<dyn FrameSource>) -> Box<dyn FrameSource> {
        self.stop_camera();
        std::mem::replace(&mut self.source, source)
    }
}
