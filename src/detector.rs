//! Repetition state machine
//!
//! One detector per session. The signal crosses the success threshold to
//! open an up excursion and must fall back to the down threshold to close
//! it; the gap between the two thresholds is the hysteresis band that keeps
//! jitter near a single boundary from minting repetitions. Classification
//! happens once, at the up-to-down crossing, against the peak of the
//! excursion.

use crate::config::ExerciseConfig;
use crate::types::{Phase, RepResult, Side};

/// Detects and classifies repetition cycles from the per-frame signal.
///
/// All timing comes from frame timestamps, never the wall clock, so a
/// replayed frame sequence reproduces the same repetitions exactly.
#[derive(Debug)]
pub struct RepDetector {
    phase: Phase,
    seq: u32,
    peak: f64,
    cycle_started_ms: u64,
    hold_started_ms: Option<u64>,
    hold_satisfied: bool,
    side: Option<Side>,

    down_threshold: f64,
    success_threshold: f64,
    success_min: f64,
    success_max: f64,
    hold_ms: u64,
    min_cycle_ms: Option<u64>,
    /// When the config's success_min tracked its success threshold, an auto
    /// threshold update moves both together
    range_tracks_threshold: bool,
}

impl RepDetector {
    pub fn from_config(config: &ExerciseConfig) -> Self {
        RepDetector {
            phase: Phase::Down,
            seq: 0,
            peak: 0.0,
            cycle_started_ms: 0,
            hold_started_ms: None,
            hold_satisfied: false,
            side: None,
            down_threshold: config.down_threshold,
            success_threshold: config.success_threshold,
            success_min: config.success_min,
            success_max: config.success_max,
            hold_ms: config.hold_ms,
            min_cycle_ms: config.min_cycle_ms,
            range_tracks_threshold: config.success_min == config.success_threshold,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rep_count(&self) -> u32 {
        self.seq
    }

    /// Replace the success threshold (calibration-derived). The down
    /// threshold is untouched; the lower bound of the success range follows
    /// when it was tracking the threshold.
    pub fn set_success_threshold(&mut self, threshold: f64) {
        if threshold > self.down_threshold {
            self.success_threshold = threshold;
            if self.range_tracks_threshold {
                self.success_min = threshold;
            }
        }
    }

    pub fn set_hold_ms(&mut self, hold_ms: u64) {
        self.hold_ms = hold_ms;
    }

    /// Advance one frame. A `None` signal carries the phase forward
    /// unchanged. Returns a finalized repetition on the frame that closed
    /// an up excursion.
    pub fn advance(
        &mut self,
        signal: Option<f64>,
        timestamp_ms: u64,
        side: Option<Side>,
    ) -> Option<RepResult> {
        let signal = signal?;

        match self.phase {
            Phase::Down | Phase::Transition => {
                if signal >= self.success_threshold {
                    self.phase = Phase::Up;
                    self.peak = signal;
                    self.cycle_started_ms = timestamp_ms;
                    self.hold_started_ms = Some(timestamp_ms);
                    self.hold_satisfied = self.hold_ms == 0;
                    self.side = side;
                } else if signal <= self.down_threshold {
                    self.phase = Phase::Down;
                } else {
                    self.phase = Phase::Transition;
                }
                None
            }
            Phase::Up => {
                if signal > self.peak {
                    self.peak = signal;
                }

                // Hold clock runs only while the signal stays above the
                // success threshold; a dip restarts it
                if signal >= self.success_threshold {
                    match self.hold_started_ms {
                        Some(started) => {
                            if timestamp_ms.saturating_sub(started) >= self.hold_ms {
                                self.hold_satisfied = true;
                            }
                        }
                        None => self.hold_started_ms = Some(timestamp_ms),
                    }
                } else {
                    self.hold_started_ms = None;
                }

                if signal <= self.down_threshold {
                    return self.finalize(timestamp_ms);
                }
                None
            }
        }
    }

    fn finalize(&mut self, timestamp_ms: u64) -> Option<RepResult> {
        self.phase = Phase::Down;
        let cycle_ms = timestamp_ms.saturating_sub(self.cycle_started_ms);
        let hold_satisfied = self.hold_satisfied;
        let side = self.side.take();
        let peak = self.peak;
        self.hold_started_ms = None;
        self.hold_satisfied = false;

        if let Some(min_cycle) = self.min_cycle_ms {
            if cycle_ms < min_cycle {
                return None;
            }
        }

        self.seq += 1;
        Some(RepResult {
            seq: self.seq,
            peak,
            success: peak >= self.success_min && peak <= self.success_max,
            side,
            hold_satisfied,
            cycle_ms,
        })
    }

    /// Back to the initial state; configured thresholds survive
    pub fn reset(&mut self) {
        self.phase = Phase::Down;
        self.seq = 0;
        self.peak = 0.0;
        self.cycle_started_ms = 0;
        self.hold_started_ms = None;
        self.hold_satisfied = false;
        self.side = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalSelector;
    use crate::types::Joint;

    fn config(down: f64, success: f64, min: f64, max: f64) -> ExerciseConfig {
        ExerciseConfig {
            id: "test".into(),
            name: "Test".into(),
            selector: SignalSelector::Joint {
                joint: Joint::LeftShoulder,
            },
            side_landmarks: None,
            down_threshold: down,
            success_threshold: success,
            success_min: min,
            success_max: max,
            hold_ms: 0,
            min_cycle_ms: None,
        }
    }

    fn drive(detector: &mut RepDetector, trace: &[f64]) -> Vec<RepResult> {
        trace
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| detector.advance(Some(s), i as u64 * 33, None))
            .collect()
    }

    #[test]
    fn test_single_cycle_yields_one_rep_with_peak() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        let reps = drive(&mut det, &[5.0, 40.0, 95.0, 130.0, 110.0, 50.0, 10.0]);

        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].seq, 1);
        assert_eq!(reps[0].peak, 130.0);
        assert!(reps[0].success);
        assert_eq!(det.phase(), Phase::Down);
    }

    #[test]
    fn test_oscillation_above_down_threshold_never_finalizes() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        let reps = drive(
            &mut det,
            &[5.0, 95.0, 60.0, 100.0, 55.0, 110.0, 40.0, 96.0],
        );
        assert!(reps.is_empty());
        assert_eq!(det.phase(), Phase::Up);
        assert_eq!(det.rep_count(), 0);
    }

    #[test]
    fn test_peak_inside_range_succeeds_outside_fails() {
        // Success range 165-180 with the excursion opening at 140
        let mut det = RepDetector::from_config(&config(20.0, 140.0, 165.0, 180.0));

        let good = drive(&mut det, &[10.0, 150.0, 170.0, 150.0, 10.0]);
        assert_eq!(good.len(), 1);
        assert!(good[0].success);
        assert_eq!(good[0].peak, 170.0);

        let shallow = drive(&mut det, &[10.0, 150.0, 145.0, 10.0]);
        assert_eq!(shallow.len(), 1);
        assert!(!shallow[0].success);
        assert_eq!(shallow[0].seq, 2);
    }

    #[test]
    fn test_transition_is_display_only() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        det.advance(Some(50.0), 0, None);
        assert_eq!(det.phase(), Phase::Transition);
        det.advance(Some(10.0), 33, None);
        assert_eq!(det.phase(), Phase::Down);
        assert_eq!(det.rep_count(), 0);
    }

    #[test]
    fn test_missing_signal_carries_phase_forward() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        det.advance(Some(100.0), 0, None);
        assert_eq!(det.phase(), Phase::Up);

        assert!(det.advance(None, 33, None).is_none());
        assert_eq!(det.phase(), Phase::Up);

        // Excursion still closes normally afterwards
        let rep = det.advance(Some(5.0), 66, None).unwrap();
        assert_eq!(rep.peak, 100.0);
    }

    #[test]
    fn test_hold_requires_continuous_time_above_threshold() {
        let mut cfg = config(20.0, 90.0, 90.0, 180.0);
        cfg.hold_ms = 100;
        let mut det = RepDetector::from_config(&cfg);

        // Dips below the success threshold at t=60 restart the hold clock
        det.advance(Some(95.0), 0, None);
        det.advance(Some(96.0), 60, None);
        det.advance(Some(85.0), 90, None); // dip
        det.advance(Some(95.0), 120, None);
        let rep = det.advance(Some(5.0), 180, None).unwrap();
        assert!(!rep.hold_satisfied);
        assert!(rep.success); // hold does not gate success

        det.advance(Some(95.0), 1000, None);
        det.advance(Some(97.0), 1120, None); // 120ms continuous
        let rep = det.advance(Some(5.0), 1200, None).unwrap();
        assert!(rep.hold_satisfied);
    }

    #[test]
    fn test_min_cycle_filter_discards_jitter() {
        let mut cfg = config(20.0, 90.0, 90.0, 180.0);
        cfg.min_cycle_ms = Some(300);
        let mut det = RepDetector::from_config(&cfg);

        // 66ms flicker through both thresholds: discarded, seq untouched
        det.advance(Some(95.0), 0, None);
        assert!(det.advance(Some(5.0), 66, None).is_none());
        assert_eq!(det.rep_count(), 0);

        // A real cycle still counts, with seq starting at 1
        det.advance(Some(95.0), 1000, None);
        det.advance(Some(120.0), 1200, None);
        let rep = det.advance(Some(5.0), 1400, None).unwrap();
        assert_eq!(rep.seq, 1);
        assert_eq!(rep.cycle_ms, 400);
    }

    #[test]
    fn test_side_recorded_at_excursion_start() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        det.advance(Some(95.0), 0, Some(Side::Right));
        det.advance(Some(110.0), 33, Some(Side::Left)); // later frames ignored
        let rep = det.advance(Some(5.0), 66, None).unwrap();
        assert_eq!(rep.side, Some(Side::Right));
    }

    #[test]
    fn test_auto_threshold_update_moves_success_range() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        det.set_success_threshold(70.0);

        let reps = drive(&mut det, &[5.0, 75.0, 80.0, 5.0]);
        assert_eq!(reps.len(), 1);
        assert!(reps[0].success); // 80 >= lowered minimum
    }

    #[test]
    fn test_threshold_update_below_down_is_ignored() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        det.set_success_threshold(10.0);
        det.advance(Some(15.0), 0, None);
        assert_eq!(det.phase(), Phase::Down);
    }

    #[test]
    fn test_reset_clears_cycle_state() {
        let mut det = RepDetector::from_config(&config(20.0, 90.0, 90.0, 180.0));
        drive(&mut det, &[5.0, 95.0, 5.0]);
        assert_eq!(det.rep_count(), 1);

        det.reset();
        assert_eq!(det.rep_count(), 0);
        assert_eq!(det.phase(), Phase::Down);

        let reps = drive(&mut det, &[5.0, 95.0, 5.0]);
        assert_eq!(reps[0].seq, 1);
    }
}
