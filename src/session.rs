//! Session lifecycle and the per-frame pipeline
//!
//! An [`ExerciseSession`] owns one exercise's full processing state: angle
//! extraction, side arbitration, calibration, the repetition state machine,
//! scoring, and payload forwarding. Frames go through synchronously, one at
//! a time, in arrival order; each produces exactly one [`FrameEvent`] for the
//! UI. Sessions are independent — two exercises running side by side never
//! share detector state.

use crate::angles::AngleExtractor;
use crate::calibration::CalibrationManager;
use crate::config::{ExerciseConfig, ExerciseRegistry};
use crate::detector::RepDetector;
use crate::encoder::EventEncoder;
use crate::error::EngineError;
use crate::schema::RawFrame;
use crate::scoring::ScoringAccumulator;
use crate::transport::{FrameSink, NullSink};
use crate::types::{FrameEvent, LandmarkFrame, Phase, SessionMetrics, SessionSummary};
use crate::visibility::{SideChoice, VisibilityArbiter};

/// Timestamp step assumed for raw frames that carry no clock (30fps)
const RAW_FRAME_STEP_MS: u64 = 33;

/// One exercise session: feed frames, read events, end for a summary.
pub struct ExerciseSession {
    config: ExerciseConfig,
    arbiter: VisibilityArbiter,
    calibration: CalibrationManager,
    detector: RepDetector,
    scorer: ScoringAccumulator,
    encoder: EventEncoder,
    sink: Box<dyn FrameSink>,
    frames_processed: u64,
    ended: bool,
    transport_failures: u64,
    last_transport_error: Option<String>,
}

impl ExerciseSession {
    /// Start a session for a validated exercise config with the given sink.
    pub fn start(config: ExerciseConfig, sink: Box<dyn FrameSink>) -> Result<Self, EngineError> {
        config.validate()?;
        let detector = RepDetector::from_config(&config);
        let encoder = EventEncoder::new(&config.id);
        Ok(ExerciseSession {
            config,
            arbiter: VisibilityArbiter::new(),
            calibration: CalibrationManager::new(),
            detector,
            scorer: ScoringAccumulator::new(),
            encoder,
            sink,
            frames_processed: 0,
            ended: false,
            transport_failures: 0,
            last_transport_error: None,
        })
    }

    /// Start a session for a built-in exercise, without forwarding.
    pub fn start_builtin(exercise_id: &str) -> Result<Self, EngineError> {
        let config = ExerciseRegistry::builtin().get(exercise_id)?.clone();
        Self::start(config, Box::new(NullSink))
    }

    pub fn exercise_id(&self) -> &str {
        self.encoder.exercise_id()
    }

    pub fn session_id(&self) -> &str {
        self.encoder.session_id()
    }

    pub fn phase(&self) -> Phase {
        self.detector.phase()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn transport_failures(&self) -> u64 {
        self.transport_failures
    }

    pub fn last_transport_error(&self) -> Option<&str> {
        self.last_transport_error.as_deref()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.scorer.metrics(self.calibration.target_scale())
    }

    /// Process one frame through the full pipeline.
    ///
    /// A frame with insufficient landmarks still produces an event: the
    /// phase carries forward, `signal` is absent, and nothing is counted.
    pub fn on_frame(&mut self, frame: &LandmarkFrame) -> Result<FrameEvent, EngineError> {
        if self.ended {
            return Err(EngineError::SessionEnded);
        }

        let angles = AngleExtractor::extract(frame);

        let choice = match &self.config.side_landmarks {
            Some(landmarks) => {
                let (left, right) = self.config.selector.side_angles(&angles);
                self.arbiter.arbitrate(frame, landmarks, left, right)
            }
            None => SideChoice::bilateral(),
        };

        let signal = self.config.selector.evaluate(&angles);
        if let Some(s) = signal {
            self.calibration.push(s);
        }
        if let Some(threshold) = self.calibration.take_auto_threshold() {
            self.detector.set_success_threshold(threshold);
        }

        let new_rep = self.detector.advance(signal, frame.timestamp_ms, choice.side);
        if let Some(rep) = &new_rep {
            self.scorer.record(rep);
        }

        let payload = self.encoder.frame_payload(
            self.frames_processed,
            frame.timestamp_ms,
            &angles,
            self.detector.phase(),
            self.detector.rep_count(),
        );
        match self.sink.submit_frame(&payload) {
            Ok(Some(feedback)) => self.scorer.push_feedback(feedback),
            Ok(None) => {}
            Err(e) => {
                self.transport_failures += 1;
                self.last_transport_error = Some(e.to_string());
            }
        }
        self.frames_processed += 1;

        let metrics = self.scorer.metrics(self.calibration.target_scale());
        Ok(FrameEvent {
            stage: self.detector.phase(),
            live_percent: signal.map(|s| self.calibration.live_percent(s)).unwrap_or(0.0),
            signal,
            chosen_side: choice.side,
            low_visibility: choice.low_visibility,
            reps: metrics.reps,
            accuracy: metrics.accuracy,
            last_feedback: self.scorer.last_feedback().map(str::to_string),
            new_rep,
        })
    }

    /// Parse and process one raw detector frame from JSON. Frames without a
    /// timestamp get a synthetic 30fps clock.
    pub fn on_raw_json(&mut self, json: &str) -> Result<FrameEvent, EngineError> {
        let raw = RawFrame::from_json(json)?;
        let fallback_ms = self.frames_processed * RAW_FRAME_STEP_MS;
        let frame = raw.into_frame(fallback_ms);
        self.on_frame(&frame)
    }

    /// Snapshot the rest position from the calibration buffer. `None` when
    /// no signal has been buffered yet.
    pub fn capture_rest(&mut self) -> Option<f64> {
        self.calibration.capture_rest()
    }

    pub fn capture_mid(&mut self) -> Option<f64> {
        self.calibration.capture_mid()
    }

    pub fn capture_peak(&mut self) -> Option<f64> {
        self.calibration.capture_peak()
    }

    /// Override the auto success-threshold ratio (rearms the auto threshold)
    pub fn set_success_ratio(&mut self, ratio: f64) -> Result<(), EngineError> {
        self.calibration.set_success_ratio(ratio)
    }

    pub fn set_hold_ms(&mut self, hold_ms: u64) {
        self.detector.set_hold_ms(hold_ms);
    }

    /// Persist calibration as JSON (captured positions and ratio; the live
    /// buffer is not included).
    pub fn save_calibration(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&self.calibration)?)
    }

    /// Restore calibration saved by [`ExerciseSession::save_calibration`].
    pub fn load_calibration(&mut self, json: &str) -> Result<(), EngineError> {
        self.calibration = serde_json::from_str(json)?;
        Ok(())
    }

    /// Clear phase, repetitions, metrics, and feedback. Calibration is kept;
    /// a mid-session restart should not force the user to recalibrate.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.scorer.reset();
        self.arbiter.reset();
    }

    /// Drop captured calibration positions and rearm the auto threshold.
    pub fn reset_calibration(&mut self) {
        self.calibration.reset_captures();
    }

    /// End the session: forward and return the summary, then refuse further
    /// frames.
    pub fn end(&mut self) -> Result<SessionSummary, EngineError> {
        if self.ended {
            return Err(EngineError::SessionEnded);
        }
        self.ended = true;

        let metrics = self.scorer.metrics(self.calibration.target_scale());
        let summary = self.encoder.summary(
            self.frames_processed,
            self.scorer.reps(),
            metrics.accuracy,
            metrics.feedback,
        );
        if let Err(e) = self.sink.submit_summary(&summary) {
            self.transport_failures += 1;
            self.last_transport_error = Some(e.to_string());
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::pose;
    use crate::config::SignalSelector;
    use crate::transport::MemorySink;
    use crate::types::{Joint, Landmark, RepResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Sink wrapper so tests can inspect a shared MemorySink after moving it
    /// into the session.
    struct SharedSink(Rc<RefCell<MemorySink>>);

    impl FrameSink for SharedSink {
        fn submit_frame(
            &mut self,
            payload: &crate::types::FramePayload,
        ) -> Result<Option<String>, EngineError> {
            self.0.borrow_mut().submit_frame(payload)
        }

        fn submit_summary(
            &mut self,
            summary: &SessionSummary,
        ) -> Result<(), EngineError> {
            self.0.borrow_mut().submit_summary(summary)
        }
    }

    fn knee_config() -> ExerciseConfig {
        ExerciseConfig {
            id: "left_knee_bend".into(),
            name: "Left Knee Bend".into(),
            selector: SignalSelector::Rescaled {
                offset: 180.0,
                gain: -1.0,
                inner: Box::new(SignalSelector::Joint {
                    joint: Joint::LeftKnee,
                }),
            },
            side_landmarks: None,
            down_threshold: 20.0,
            success_threshold: 90.0,
            success_min: 90.0,
            success_max: 180.0,
            hold_ms: 0,
            min_cycle_ms: None,
        }
    }

    /// Full 33-point pose frame with the left knee at the given angle.
    fn knee_frame(timestamp_ms: u64, knee_deg: f64) -> LandmarkFrame {
        let filler = Landmark {
            x: 0.5,
            y: 0.5,
            z: 0.0,
            visibility: 1.0,
        };
        let mut points = vec![filler; pose::POINT_COUNT];
        points[pose::LEFT_HIP] = Landmark {
            x: 0.5,
            y: 0.2,
            z: 0.0,
            visibility: 1.0,
        };
        points[pose::LEFT_KNEE] = filler;
        // Ankle rotated about the knee so hip-knee-ankle forms knee_deg
        let phi = (180.0 - knee_deg).to_radians();
        points[pose::LEFT_ANKLE] = Landmark {
            x: 0.5 + 0.3 * phi.sin(),
            y: 0.5 + 0.3 * phi.cos(),
            z: 0.0,
            visibility: 1.0,
        };
        LandmarkFrame {
            timestamp_ms,
            pose: points,
            face: vec![],
            hand: vec![],
        }
    }

    /// Knee angles tracing one bend-and-return cycle in signal space:
    /// signal = 180 - knee
    fn cycle_angles() -> Vec<f64> {
        // signals: 5, 50, 100, 130, 95, 40, 10
        vec![175.0, 130.0, 80.0, 50.0, 85.0, 140.0, 170.0]
    }

    fn run_cycle(session: &mut ExerciseSession) -> Vec<FrameEvent> {
        cycle_angles()
            .iter()
            .enumerate()
            .map(|(i, &deg)| session.on_frame(&knee_frame(i as u64 * 33, deg)).unwrap())
            .collect()
    }

    #[test]
    fn test_full_cycle_counts_one_rep() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        let events = run_cycle(&mut session);

        let finalizing = events.iter().filter(|e| e.new_rep.is_some()).count();
        assert_eq!(finalizing, 1);

        let rep = events.last().unwrap().new_rep.as_ref().unwrap();
        assert!(rep.success);
        assert!((rep.peak - 130.0).abs() < 1.0);

        let metrics = session.metrics();
        assert_eq!(metrics.reps.success, 1);
        assert_eq!(metrics.reps.fail, 0);
    }

    #[test]
    fn test_empty_frames_carry_phase_forward() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        session.on_frame(&knee_frame(0, 80.0)).unwrap(); // signal 100, Up

        let event = session
            .on_frame(&LandmarkFrame {
                timestamp_ms: 33,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(event.stage, Phase::Up);
        assert_eq!(event.signal, None);
        assert_eq!(event.live_percent, 0.0);

        // Cycle closes normally after the gap
        let event = session.on_frame(&knee_frame(66, 175.0)).unwrap();
        assert!(event.new_rep.is_some());
    }

    #[test]
    fn test_live_percent_against_captured_range() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();

        // Hold rest at signal 20, capture
        session.on_frame(&knee_frame(0, 160.0)).unwrap();
        assert!((session.capture_rest().unwrap() - 20.0).abs() < 1.0);

        session.reset(); // fresh buffer state not needed, but fresh phase
        for i in 1..=60 {
            session.on_frame(&knee_frame(i * 33, 80.0)).unwrap(); // signal 100
        }
        assert!((session.capture_peak().unwrap() - 100.0).abs() < 1.0);

        // Signal 60 inside a 20-100 range reads as 50%
        let event = session.on_frame(&knee_frame(3000, 120.0)).unwrap();
        assert!((event.live_percent - 50.0).abs() < 2.0);
    }

    #[test]
    fn test_auto_threshold_applies_after_calibration() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();

        session.on_frame(&knee_frame(0, 175.0)).unwrap(); // signal 5
        session.capture_rest().unwrap();
        for i in 1..=60 {
            session.on_frame(&knee_frame(i * 33, 115.0)).unwrap(); // signal 65
        }
        session.capture_peak().unwrap();

        // Auto threshold = 5 + 0.85 * 60 = 56; a 60-degree signal now opens
        // an excursion even though the configured threshold was 90
        session.on_frame(&knee_frame(3000, 175.0)).unwrap();
        let event = session.on_frame(&knee_frame(3033, 120.0)).unwrap(); // signal 60
        assert_eq!(event.stage, Phase::Up);

        let event = session.on_frame(&knee_frame(3066, 175.0)).unwrap();
        let rep = event.new_rep.unwrap();
        assert!(rep.success);
    }

    #[test]
    fn test_end_freezes_session() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        run_cycle(&mut session);

        let summary = session.end().unwrap();
        assert_eq!(summary.total_reps, 1);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.frames_processed, 7);

        assert!(matches!(
            session.on_frame(&knee_frame(9999, 90.0)),
            Err(EngineError::SessionEnded)
        ));
        assert!(matches!(session.end(), Err(EngineError::SessionEnded)));
    }

    #[test]
    fn test_reset_keeps_calibration() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        session.on_frame(&knee_frame(0, 160.0)).unwrap();
        session.capture_rest().unwrap();
        run_cycle(&mut session);
        assert_eq!(session.metrics().reps.total(), 1);

        session.reset();
        assert_eq!(session.metrics().reps.total(), 0);
        assert_eq!(session.phase(), Phase::Down);

        // Rest capture survived the reset
        let saved = session.save_calibration().unwrap();
        assert!(saved.contains("\"rest\":"));
        assert!(!saved.contains("\"rest\":null"));

        session.reset_calibration();
        let cleared = session.save_calibration().unwrap();
        assert!(cleared.contains("\"rest\":null"));
    }

    #[test]
    fn test_calibration_round_trip() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        session.on_frame(&knee_frame(0, 160.0)).unwrap();
        session.capture_rest().unwrap();
        let saved = session.save_calibration().unwrap();

        let mut other = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        other.load_calibration(&saved).unwrap();
        let reloaded = other.save_calibration().unwrap();
        assert_eq!(saved, reloaded);
    }

    #[test]
    fn test_transport_failure_never_blocks_detection() {
        let shared = Rc::new(RefCell::new(MemorySink {
            failing: true,
            ..MemorySink::new()
        }));
        let mut session =
            ExerciseSession::start(knee_config(), Box::new(SharedSink(shared.clone()))).unwrap();

        let events = run_cycle(&mut session);
        assert_eq!(events.iter().filter(|e| e.new_rep.is_some()).count(), 1);
        assert_eq!(session.transport_failures(), 7);
        assert!(session.last_transport_error().unwrap().contains("sink"));
        assert!(shared.borrow().frames.is_empty());
    }

    #[test]
    fn test_sink_feedback_lands_in_metrics() {
        let shared = Rc::new(RefCell::new(MemorySink::new()));
        shared.borrow_mut().queued_feedback = vec!["go deeper".into()];
        let mut session =
            ExerciseSession::start(knee_config(), Box::new(SharedSink(shared.clone()))).unwrap();

        let event = session.on_frame(&knee_frame(0, 170.0)).unwrap();
        assert_eq!(event.last_feedback.as_deref(), Some("go deeper"));
        assert_eq!(session.metrics().feedback, vec!["go deeper"]);
        assert_eq!(shared.borrow().frames.len(), 1);
    }

    #[test]
    fn test_summary_forwarded_to_sink() {
        let shared = Rc::new(RefCell::new(MemorySink::new()));
        let mut session =
            ExerciseSession::start(knee_config(), Box::new(SharedSink(shared.clone()))).unwrap();
        run_cycle(&mut session);
        session.end().unwrap();

        let sink = shared.borrow();
        assert_eq!(sink.summaries.len(), 1);
        assert_eq!(sink.summaries[0].total_reps, 1);
        assert_eq!(sink.frames.len(), 7);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let run = || -> Vec<RepResult> {
            let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
            let mut reps = Vec::new();
            let trace = [
                175.0, 120.0, 70.0, 60.0, 110.0, 170.0, // rep 1
                165.0, 90.0, 55.0, 100.0, 172.0, // rep 2
                150.0, 130.0, 168.0, // partial, no rep
            ];
            for (i, &deg) in trace.iter().enumerate() {
                let event = session.on_frame(&knee_frame(i as u64 * 33, deg)).unwrap();
                if let Some(rep) = event.new_rep {
                    reps.push(rep);
                }
            }
            reps
        };

        let first = run();
        let second = run();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let mut config = knee_config();
        config.down_threshold = 200.0;
        assert!(matches!(
            ExerciseSession::start(config, Box::new(NullSink)),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_start_builtin_unknown_exercise() {
        assert!(matches!(
            ExerciseSession::start_builtin("handstand"),
            Err(EngineError::UnknownExercise(_))
        ));
        assert!(ExerciseSession::start_builtin("squat").is_ok());
    }

    #[test]
    fn test_raw_json_frames_drive_the_pipeline() {
        let mut session = ExerciseSession::start(knee_config(), Box::new(NullSink)).unwrap();
        // Empty detection miss parses and emits an event
        let event = session.on_raw_json("{}").unwrap();
        assert_eq!(event.signal, None);
        assert_eq!(event.stage, Phase::Down);

        assert!(session.on_raw_json("garbage").is_err());
        // A parse failure does not advance the frame counter
        assert_eq!(session.frames_processed(), 1);
    }
}
