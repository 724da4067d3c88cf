//! Running session metrics
//!
//! Two accuracy measures run side by side: the success ratio (how many
//! attempts counted) and angle accuracy (how close each attempt's peak came
//! to the target scale). Angle accuracy is recomputed from stored peaks on
//! every read, so a calibration captured mid-session renormalizes the whole
//! history instead of mixing scales.

use std::collections::VecDeque;

use crate::types::{Accuracy, RepCounts, RepResult, SessionMetrics};

/// Most recent feedback strings kept for display
pub const FEEDBACK_LOG_CAPACITY: usize = 3;

/// Accumulates finalized repetitions and coach feedback for one session
#[derive(Debug, Default)]
pub struct ScoringAccumulator {
    reps: Vec<RepResult>,
    counts: RepCounts,
    feedback: VecDeque<String>,
}

impl ScoringAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finalized repetition
    pub fn record(&mut self, rep: &RepResult) {
        if rep.success {
            self.counts.success += 1;
        } else {
            self.counts.fail += 1;
        }
        self.reps.push(rep.clone());
    }

    /// Append a feedback string, dropping the oldest past capacity
    pub fn push_feedback(&mut self, message: String) {
        self.feedback.push_back(message);
        while self.feedback.len() > FEEDBACK_LOG_CAPACITY {
            self.feedback.pop_front();
        }
    }

    pub fn last_feedback(&self) -> Option<&str> {
        self.feedback.back().map(String::as_str)
    }

    pub fn counts(&self) -> RepCounts {
        self.counts
    }

    pub fn reps(&self) -> &[RepResult] {
        &self.reps
    }

    /// Current metrics, normalized against the given target scale (the
    /// calibrated span, or the default before calibration).
    pub fn metrics(&self, target_scale: f64) -> SessionMetrics {
        SessionMetrics {
            reps: self.counts,
            accuracy: self.accuracy(target_scale),
            feedback: self.feedback.iter().cloned().collect(),
        }
    }

    pub fn accuracy(&self, target_scale: f64) -> Accuracy {
        let total = self.counts.total();
        let ratio = if total == 0 {
            0.0
        } else {
            f64::from(self.counts.success) / f64::from(total) * 100.0
        };

        let angle_based = if self.reps.is_empty() || target_scale <= 0.0 {
            0.0
        } else {
            let sum: f64 = self
                .reps
                .iter()
                .map(|rep| (rep.peak / target_scale).clamp(0.0, 1.0))
                .sum();
            sum / self.reps.len() as f64 * 100.0
        };

        Accuracy { ratio, angle_based }
    }

    pub fn reset(&mut self) {
        self.reps.clear();
        self.counts = RepCounts::default();
        self.feedback.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::DEFAULT_TARGET_SCALE_DEG;

    fn rep(seq: u32, peak: f64, success: bool) -> RepResult {
        RepResult {
            seq,
            peak,
            success,
            side: None,
            hold_satisfied: true,
            cycle_ms: 1000,
        }
    }

    #[test]
    fn test_ratio_three_successes_one_fail() {
        let mut scorer = ScoringAccumulator::new();
        scorer.record(&rep(1, 90.0, true));
        scorer.record(&rep(2, 95.0, true));
        scorer.record(&rep(3, 40.0, false));
        scorer.record(&rep(4, 92.0, true));

        let accuracy = scorer.accuracy(DEFAULT_TARGET_SCALE_DEG);
        assert_eq!(accuracy.ratio, 75.0);
        assert_eq!(scorer.counts().total(), 4);
    }

    #[test]
    fn test_angle_accuracy_clamps_each_term() {
        let mut scorer = ScoringAccumulator::new();
        scorer.record(&rep(1, 45.0, false)); // half the scale
        scorer.record(&rep(2, 135.0, true)); // past the scale, clamps to 1

        let accuracy = scorer.accuracy(90.0);
        assert_eq!(accuracy.angle_based, 75.0);
    }

    #[test]
    fn test_recalibration_renormalizes_history() {
        let mut scorer = ScoringAccumulator::new();
        scorer.record(&rep(1, 45.0, true));

        assert_eq!(scorer.accuracy(90.0).angle_based, 50.0);
        // Narrower calibrated span: the same peak now reads as complete
        assert_eq!(scorer.accuracy(45.0).angle_based, 100.0);
    }

    #[test]
    fn test_empty_session_reads_zero() {
        let scorer = ScoringAccumulator::new();
        let metrics = scorer.metrics(DEFAULT_TARGET_SCALE_DEG);
        assert_eq!(metrics.accuracy.ratio, 0.0);
        assert_eq!(metrics.accuracy.angle_based, 0.0);
        assert_eq!(metrics.reps.total(), 0);
    }

    #[test]
    fn test_feedback_log_is_bounded() {
        let mut scorer = ScoringAccumulator::new();
        for i in 0..5 {
            scorer.push_feedback(format!("cue {i}"));
        }

        let metrics = scorer.metrics(DEFAULT_TARGET_SCALE_DEG);
        assert_eq!(metrics.feedback, vec!["cue 2", "cue 3", "cue 4"]);
        assert_eq!(scorer.last_feedback(), Some("cue 4"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut scorer = ScoringAccumulator::new();
        scorer.record(&rep(1, 90.0, true));
        scorer.push_feedback("good".into());

        scorer.reset();
        assert!(scorer.reps().is_empty());
        assert_eq!(scorer.counts(), RepCounts::default());
        assert_eq!(scorer.last_feedback(), None);
    }
}
