/// Frame pipeline
///
/// One iteration pulls the latest frame, runs detection, feeds the snapshot
/// to the rule engine and scores whatever it emits:
///
/// ```text
/// tick ──> CaptureManager::get_frame
///            │
///            ▼
///          DetectionEngine::detect_all      (rayon fan-out)
///            │  cancelled? ──> discard
///            ▼
///          RuleEngine::process_detections
///            │  CricketEvent
///            ▼
///          MatchSession::apply ──> LiveScoringEngine ──> MatchStore
/// ```
///
/// [`FrameLoop`] runs iterations on a dedicated thread, paced by a
/// `crossbeam_channel::tick`. The tick channel holds one pending tick, so a
/// slow iteration skips ticks instead of queueing them and iterations never
/// overlap.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capture::{CameraBackend, CaptureConfig, CaptureManager};
use crate::detection::DetectionEngine;
use crate::error::PipelineError;
use crate::messaging::{EventBus, PipelineEvent, UpdateKind};
use crate::rules::{CricketEvent, RuleEngine};
use crate::scoring::AppliedBall;
use crate::state::{MatchSession, ProcessState, ProcessStateMachine, Transition, TransitionError};
use crate::utils::{IterationTiming, LatencyStats};

/// What a single iteration produced
#[derive(Debug)]
pub enum IterationOutcome {
    /// Capture is not active
    NoFrame,
    NoEvent,
    /// Detection finished after the loop was cancelled
    Discarded,
    Scored {
        event: CricketEvent,
        applied: Box<AppliedBall>,
    },
}

pub struct FramePipeline<B: CameraBackend> {
    capture: CaptureManager<B>,
    detection: DetectionEngine,
    rules: RuleEngine,
    session: Arc<MatchSession>,
    cancelled: Arc<AtomicBool>,
    latency: LatencyStats,
}

impl<B: CameraBackend> FramePipeline<B> {
    pub fn new(
        capture: CaptureManager<B>,
        detection: DetectionEngine,
        rules: RuleEngine,
        session: Arc<MatchSession>,
    ) -> Self {
        Self {
            capture,
            detection,
            rules,
            session,
            cancelled: Arc::new(AtomicBool::new(false)),
            latency: LatencyStats::with_capacity(1024),
        }
    }

    /// Load the model and open the camera
    pub fn start(&mut self, config: &CaptureConfig) -> Result<(), PipelineError> {
        self.detection.initialize()?;
        self.capture.start(config)?;
        self.rules.reset();
        self.cancelled.store(false, Ordering::Release);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.capture.stop();
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn session(&self) -> &Arc<MatchSession> {
        &self.session
    }

    pub fn capture(&self) -> &CaptureManager<B> {
        &self.capture
    }

    pub fn detection(&self) -> &DetectionEngine {
        &self.detection
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    pub fn take_latency(&mut self) -> LatencyStats {
        std::mem::take(&mut self.latency)
    }

    /// Run capture → detect → rules → scoring once, to completion
    pub fn run_iteration(&mut self) -> Result<IterationOutcome, PipelineError> {
        let started = Instant::now();
        let mut timing = IterationTiming::new();

        let Some(frame) = self.capture.get_frame()? else {
            return Ok(IterationOutcome::NoFrame);
        };
        timing.capture_us = micros_since(started);

        let stage = Instant::now();
        let snapshot = self.detection.detect_all(&frame)?;
        timing.detect_us = micros_since(stage);

        if self.is_cancelled() {
            debug!(frame = frame.index, "Loop cancelled during detection; result discarded");
            return Ok(IterationOutcome::Discarded);
        }

        let stage = Instant::now();
        let event = self.rules.process_detections(&snapshot);
        timing.rules_us = micros_since(stage);

        let stage = Instant::now();
        let outcome = match event {
            Some(event) => {
                let applied = self.session.apply(&event)?;
                IterationOutcome::Scored {
                    event,
                    applied: Box::new(applied),
                }
            }
            None => IterationOutcome::NoEvent,
        };
        timing.scoring_us = micros_since(stage);
        timing.total_us = micros_since(started);
        self.latency.add(timing);

        Ok(outcome)
    }
}

fn micros_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1_000_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    pub interval: Duration,
    /// Stop after this many iterations (benchmarks, tests)
    pub max_iterations: Option<u64>,
}

impl LoopOptions {
    pub fn from_frame_rate(fps: u32) -> Self {
        Self {
            interval: Duration::from_micros(1_000_000 / u64::from(fps.max(1))),
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max: u64) -> Self {
        self.max_iterations = Some(max);
        self
    }
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from_frame_rate(crate::capture::DEFAULT_FRAME_RATE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopCommand {
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MatchEnded,
    IterationLimit,
}

#[derive(Debug)]
pub struct LoopReport {
    pub iterations: u64,
    pub events: u64,
    pub discarded: u64,
    pub transient_errors: u64,
    pub stop_reason: StopReason,
    pub latency: LatencyStats,
}

/// Handle to a running frame loop thread
pub struct FrameLoop {
    handle: Option<JoinHandle<Result<LoopReport, PipelineError>>>,
    commands: Sender<LoopCommand>,
    cancelled: Arc<AtomicBool>,
    state: Arc<Mutex<ProcessStateMachine>>,
    events: EventBus<PipelineEvent>,
}

impl FrameLoop {
    /// Open the camera, load the model and start iterating
    ///
    /// Start-up failures are returned here; once running, capture and
    /// detection failures are retried on the next tick and any other
    /// failure ends the loop and is returned from [`FrameLoop::join`].
    pub fn spawn<B>(
        mut pipeline: FramePipeline<B>,
        capture_config: &CaptureConfig,
        options: LoopOptions,
        events: EventBus<PipelineEvent>,
    ) -> Result<Self, PipelineError>
    where
        B: CameraBackend + 'static,
    {
        let state = Arc::new(Mutex::new(ProcessStateMachine::new()));
        apply_transition(&state, &events, ProcessStateMachine::start)
            .map_err(|_| PipelineError::AlreadyRunning)?;

        if let Err(err) = pipeline.start(capture_config) {
            error!("Frame loop failed to start: {}", err);
            pipeline.shutdown();
            publish_transition(&events, state.lock().force_stop());
            return Err(err);
        }

        let cancelled = pipeline.cancel_flag();
        let (commands, command_rx) = bounded(1);
        let thread_state = Arc::clone(&state);
        let thread_events = events.clone();

        apply_transition(&state, &events, ProcessStateMachine::mark_running)
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let handle = thread::Builder::new()
            .name("frame-loop".to_string())
            .spawn(move || {
                run_loop(pipeline, options, command_rx, thread_state, thread_events)
            })
            .map_err(|err| {
                publish_transition(&events, state.lock().force_stop());
                PipelineError::ThreadSpawnFailed(err)
            })?;
        info!(interval_ms = options.interval.as_millis() as u64, "Frame loop started");

        Ok(Self {
            handle: Some(handle),
            commands,
            cancelled,
            state,
            events,
        })
    }

    pub fn state(&self) -> ProcessState {
        self.state.lock().state()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn events(&self) -> &EventBus<PipelineEvent> {
        &self.events
    }

    /// Request a stop; an in-flight detection result will be discarded
    pub fn cancel(&self) {
        let _ = apply_transition(&self.state, &self.events, ProcessStateMachine::stop);
        self.cancelled.store(true, Ordering::Release);
        let _ = self.commands.try_send(LoopCommand::Stop);
    }

    /// Wait for the loop thread to finish
    pub fn join(mut self) -> Result<LoopReport, PipelineError> {
        let handle = self.handle.take().ok_or(PipelineError::NotRunning)?;
        handle.join().map_err(|_| PipelineError::ThreadPanicked)?
    }

    pub fn stop(self) -> Result<LoopReport, PipelineError> {
        self.cancel();
        self.join()
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel();
            let _ = handle.join();
        }
    }
}

fn publish_transition(events: &EventBus<PipelineEvent>, (old_state, new_state): Transition) {
    debug!("Frame loop state: {:?} -> {:?}", old_state, new_state);
    events.publish(PipelineEvent::StateChanged {
        old_state,
        new_state,
    });
}

fn apply_transition(
    state: &Mutex<ProcessStateMachine>,
    events: &EventBus<PipelineEvent>,
    transition: impl FnOnce(&mut ProcessStateMachine) -> Result<Transition, TransitionError>,
) -> Result<(), TransitionError> {
    let mut machine = state.lock();
    let change = transition(&mut machine)?;
    publish_transition(events, change);
    Ok(())
}

fn run_loop<B: CameraBackend>(
    mut pipeline: FramePipeline<B>,
    options: LoopOptions,
    commands: Receiver<LoopCommand>,
    state: Arc<Mutex<ProcessStateMachine>>,
    events: EventBus<PipelineEvent>,
) -> Result<LoopReport, PipelineError> {
    let ticker = crossbeam_channel::tick(options.interval);
    let mut iterations = 0u64;
    let mut scored = 0u64;
    let mut discarded = 0u64;
    let mut transient_errors = 0u64;

    let result = loop {
        select! {
            recv(commands) -> _ => break Ok(StopReason::Cancelled),
            recv(ticker) -> _ => {}
        }
        if pipeline.is_cancelled() {
            break Ok(StopReason::Cancelled);
        }

        iterations += 1;
        match pipeline.run_iteration() {
            Ok(IterationOutcome::NoFrame) | Ok(IterationOutcome::NoEvent) => {}
            Ok(IterationOutcome::Discarded) => discarded += 1,
            Ok(IterationOutcome::Scored { event, applied }) => {
                scored += 1;
                events.publish(PipelineEvent::EventScored {
                    description: event.description(),
                    confidence: event.confidence(),
                });
                if applied.has(UpdateKind::MatchEnd) {
                    break Ok(StopReason::MatchEnded);
                }
            }
            Err(err) if err.is_transient() => {
                transient_errors += 1;
                warn!("Frame loop iteration {} failed, retrying: {}", iterations, err);
                events.publish(PipelineEvent::IterationFailed {
                    message: err.to_string(),
                    transient: true,
                });
            }
            Err(err) => {
                error!("Frame loop stopped: {}", err);
                events.publish(PipelineEvent::IterationFailed {
                    message: err.to_string(),
                    transient: false,
                });
                break Err(err);
            }
        }

        if options.max_iterations.is_some_and(|max| iterations >= max) {
            break Ok(StopReason::IterationLimit);
        }
    };

    pipeline.shutdown();

    {
        let mut machine = state.lock();
        if machine.state().is_running() {
            if let Ok(change) = machine.stop() {
                publish_transition(&events, change);
            }
        }
        let change = match machine.mark_stopped() {
            Ok(change) => change,
            Err(_) => machine.force_stop(),
        };
        publish_transition(&events, change);
    }

    info!(
        iterations,
        events = scored,
        discarded,
        transient_errors,
        "Frame loop finished"
    );

    result.map(|stop_reason| LoopReport {
        iterations,
        events: scored,
        discarded,
        transient_errors,
        stop_reason,
        latency: pipeline.take_latency(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use crate::detection::{
        BoundingBox, DetectionThresholds, ObjectModel, Point, RawDetection, ScriptedModel,
    };
    use crate::error::{CaptureError, DetectionError, ScoringError};
    use crate::rules::RuleConfig;
    use crate::capture::Frame;
    use crate::scoring::{LiveScoringEngine, ScoringOptions};
    use crate::state::Lineup;
    use crate::store::{CreatePlayerRequest, CreateTeamRequest, MatchStore, PlayerRole};

    fn six_ball() -> Vec<RawDetection> {
        vec![RawDetection::new(
            "sports ball",
            0.9,
            BoundingBox::centered_at(Point::new(640.0, 30.0), 12.0, 12.0),
        )]
    }

    /// Six on frame 1, nothing after
    fn six_script() -> Vec<Vec<RawDetection>> {
        let mut script = vec![six_ball()];
        script.extend(std::iter::repeat(Vec::new()).take(999));
        script
    }

    fn session(live: bool) -> Arc<MatchSession> {
        let store = Arc::new(MatchStore::in_memory());
        let batsman = store
            .create_player(CreatePlayerRequest::new("Opener", PlayerRole::Batsman))
            .unwrap()
            .id;
        let bowler = store
            .create_player(CreatePlayerRequest::new("Quick", PlayerRole::Bowler))
            .unwrap()
            .id;
        let team_a = store
            .create_team(CreateTeamRequest::new("Strikers").with_players(vec![batsman.clone()]))
            .unwrap()
            .id;
        let team_b = store
            .create_team(CreateTeamRequest::new("Titans").with_players(vec![bowler.clone()]))
            .unwrap()
            .id;
        let engine = Arc::new(LiveScoringEngine::new(store, ScoringOptions::default()));
        if live {
            engine.start_match(&team_a, &team_b, 20).unwrap();
        }
        Arc::new(MatchSession::new(engine, Lineup::new(batsman, bowler)))
    }

    fn pipeline_with(
        camera: SyntheticCamera,
        model: Box<dyn ObjectModel>,
        session: Arc<MatchSession>,
    ) -> FramePipeline<SyntheticCamera> {
        FramePipeline::new(
            CaptureManager::new(camera),
            DetectionEngine::new(model, DetectionThresholds::default()),
            RuleEngine::new(RuleConfig::default()),
            session,
        )
    }

    fn fast() -> LoopOptions {
        LoopOptions {
            interval: Duration::from_millis(2),
            max_iterations: None,
        }
    }

    #[test]
    fn test_iteration_scores_six() {
        let session = session(true);
        let mut pipeline = pipeline_with(
            SyntheticCamera::with_default_devices(),
            Box::new(ScriptedModel::new(six_script())),
            Arc::clone(&session),
        );
        pipeline.start(&CaptureConfig::default()).unwrap();

        match pipeline.run_iteration().unwrap() {
            IterationOutcome::Scored { event, applied } => {
                assert_eq!(event.description(), "SIX! Cleared the rope");
                assert_eq!(applied.score.team_a_score, 6);
            }
            other => panic!("Expected a scored six, got {:?}", other),
        }
        assert!(matches!(
            pipeline.run_iteration().unwrap(),
            IterationOutcome::NoEvent
        ));
        assert_eq!(pipeline.latency().len(), 2);
        assert_eq!(session.score().unwrap().team_a_score, 6);
    }

    #[test]
    fn test_inactive_capture_yields_no_frame() {
        let mut pipeline = pipeline_with(
            SyntheticCamera::with_default_devices(),
            Box::new(ScriptedModel::new(six_script())),
            session(true),
        );
        assert!(matches!(
            pipeline.run_iteration().unwrap(),
            IterationOutcome::NoFrame
        ));
    }

    /// Sets the cancel flag while inference is in flight
    struct CancellingModel {
        inner: ScriptedModel,
        flag: Arc<AtomicBool>,
    }

    impl ObjectModel for CancellingModel {
        fn load(&mut self) -> Result<(), DetectionError> {
            self.inner.load()
        }

        fn infer(&self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError> {
            let out = self.inner.infer(frame);
            self.flag.store(true, Ordering::Release);
            out
        }

        fn name(&self) -> &str {
            "CancellingModel"
        }
    }

    #[test]
    fn test_detection_finishing_after_cancel_is_discarded() {
        let session = session(true);
        let flag = Arc::new(AtomicBool::new(false));
        let model = CancellingModel {
            inner: ScriptedModel::new(six_script()),
            flag: Arc::clone(&flag),
        };
        let mut pipeline = FramePipeline::new(
            CaptureManager::new(SyntheticCamera::with_default_devices()),
            DetectionEngine::new(Box::new(model), DetectionThresholds::default()),
            RuleEngine::new(RuleConfig::default()),
            Arc::clone(&session),
        );
        pipeline.cancelled = flag;
        pipeline.capture.start(&CaptureConfig::default()).unwrap();
        pipeline.detection.initialize().unwrap();

        assert!(matches!(
            pipeline.run_iteration().unwrap(),
            IterationOutcome::Discarded
        ));
        assert_eq!(session.score().unwrap().team_a_score, 0);
        assert_eq!(pipeline.rules().stats().snapshots_processed, 0);
    }

    #[test]
    fn test_loop_runs_to_iteration_limit() {
        let session = session(true);
        let pipeline = pipeline_with(
            SyntheticCamera::with_default_devices(),
            Box::new(ScriptedModel::new(six_script())),
            Arc::clone(&session),
        );
        let frame_loop = FrameLoop::spawn(
            pipeline,
            &CaptureConfig::default(),
            fast().with_max_iterations(5),
            EventBus::new(),
        )
        .unwrap();

        let report = frame_loop.join().unwrap();
        assert_eq!(report.stop_reason, StopReason::IterationLimit);
        assert_eq!(report.iterations, 5);
        assert_eq!(report.events, 1);
        assert_eq!(report.latency.len(), 5);
        assert_eq!(session.score().unwrap().team_a_score, 6);
    }

    #[test]
    fn test_cancel_stops_loop_and_reports_states() {
        let events = EventBus::new();
        let (rx, _sub) = events.subscribe();
        let pipeline = pipeline_with(
            SyntheticCamera::with_default_devices(),
            Box::new(ScriptedModel::new(Vec::new())),
            session(true),
        );
        let frame_loop =
            FrameLoop::spawn(pipeline, &CaptureConfig::default(), fast(), events).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let report = frame_loop.stop().unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);

        let states: Vec<ProcessState> = rx
            .try_iter()
            .filter_map(|event| match event {
                PipelineEvent::StateChanged { new_state, .. } => Some(new_state),
                _ => None,
            })
            .collect();
        assert_eq!(states.first(), Some(&ProcessState::Starting));
        assert!(states[1].is_running());
        assert_eq!(states.last(), Some(&ProcessState::Stopped));
        assert!(states.contains(&ProcessState::Stopping));
    }

    #[test]
    fn test_transient_capture_errors_are_retried() {
        let pipeline = pipeline_with(
            SyntheticCamera::with_default_devices()
                .fail_reads(CaptureError::NotReadable("busy".to_string())),
            Box::new(ScriptedModel::new(Vec::new())),
            session(true),
        );
        let report = FrameLoop::spawn(
            pipeline,
            &CaptureConfig::default(),
            fast().with_max_iterations(3),
            EventBus::new(),
        )
        .unwrap()
        .join()
        .unwrap();
        assert_eq!(report.transient_errors, 3);
        assert_eq!(report.events, 0);
    }

    #[test]
    fn test_scoring_error_ends_loop() {
        let pipeline = pipeline_with(
            SyntheticCamera::with_default_devices(),
            Box::new(ScriptedModel::new(six_script())),
            session(false),
        );
        let result = FrameLoop::spawn(pipeline, &CaptureConfig::default(), fast(), EventBus::new())
            .unwrap()
            .join();
        assert!(matches!(
            result,
            Err(PipelineError::Scoring(ScoringError::NoLiveMatch))
        ));
    }

    #[test]
    fn test_start_failure_is_returned() {
        let pipeline = pipeline_with(
            SyntheticCamera::with_default_devices().fail_open(CaptureError::PermissionDenied),
            Box::new(ScriptedModel::new(Vec::new())),
            session(true),
        );
        let result = FrameLoop::spawn(pipeline, &CaptureConfig::default(), fast(), EventBus::new());
        assert!(matches!(
            result,
            Err(PipelineError::Capture(CaptureError::PermissionDenied))
        ));

        let pipeline = pipeline_with(
            SyntheticCamera::with_default_devices(),
            Box::new(ScriptedModel::broken()),
            session(true),
        );
        let result = FrameLoop::spawn(pipeline, &CaptureConfig::default(), fast(), EventBus::new());
        assert!(matches!(
            result,
            Err(PipelineError::Detection(DetectionError::ModelLoadFailed(_)))
        ));
    }
}
