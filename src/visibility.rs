//! Side arbitration by landmark visibility
//!
//! Side-specific exercises (a one-arm raise, a single-leg lift) need to know
//! which limb the user is actually working. The arbiter compares mean
//! detector confidence over each side's landmark set and attributes the frame
//! to a side; when neither side is trustworthy it keeps a run counter and
//! raises a low-visibility hint so the caller can prompt the user to adjust
//! their position.

use crate::types::{LandmarkFrame, Side};

/// Mean confidence below this marks a side as unreliable
pub const VISIBILITY_THRESHOLD: f64 = 0.6;

/// Consecutive frames with neither side visible before the hint is raised
pub const LOW_VISIBILITY_RUN_LIMIT: u32 = 10;

/// Landmark index sets backing each side's visibility score
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SideLandmarks {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

/// Outcome of arbitration for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideChoice {
    pub side: Option<Side>,
    /// True once neither side has been reliably visible for a sustained run
    pub low_visibility: bool,
}

impl SideChoice {
    /// Choice for exercises with no side distinction
    pub fn bilateral() -> Self {
        SideChoice {
            side: None,
            low_visibility: false,
        }
    }
}

/// Per-session arbiter. Holds only the low-visibility run counter; all
/// per-frame inputs come in through [`VisibilityArbiter::arbitrate`].
#[derive(Debug, Default)]
pub struct VisibilityArbiter {
    low_run: u32,
}

impl VisibilityArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.low_run = 0;
    }

    /// Choose a side for this frame.
    ///
    /// Both sides reliably visible: the side with the larger current angle
    /// wins (the working limb moves, the idle one does not). Exactly one
    /// reliable: that side. Neither: the side with the higher mean confidence
    /// is still attributed, but the low-visibility run advances; the hint is
    /// surfaced once the run reaches [`LOW_VISIBILITY_RUN_LIMIT`] and clears
    /// as soon as either side recovers.
    pub fn arbitrate(
        &mut self,
        frame: &LandmarkFrame,
        landmarks: &SideLandmarks,
        left_angle: Option<f64>,
        right_angle: Option<f64>,
    ) -> SideChoice {
        let left_vis = mean_visibility(&frame.pose, &landmarks.left);
        let right_vis = mean_visibility(&frame.pose, &landmarks.right);

        let left_ok = left_vis >= VISIBILITY_THRESHOLD;
        let right_ok = right_vis >= VISIBILITY_THRESHOLD;

        let side = match (left_ok, right_ok) {
            (true, false) => Side::Left,
            (false, true) => Side::Right,
            (true, true) => match (left_angle, right_angle) {
                (Some(l), Some(r)) if r > l => Side::Right,
                (Some(_), _) => Side::Left,
                (None, Some(_)) => Side::Right,
                // Neither angle computed; fall back to confidence
                (None, None) => higher_confidence(left_vis, right_vis),
            },
            (false, false) => higher_confidence(left_vis, right_vis),
        };

        if left_ok || right_ok {
            self.low_run = 0;
        } else {
            self.low_run = self.low_run.saturating_add(1);
        }

        SideChoice {
            side: Some(side),
            low_visibility: self.low_run >= LOW_VISIBILITY_RUN_LIMIT,
        }
    }
}

fn higher_confidence(left_vis: f64, right_vis: f64) -> Side {
    if right_vis > left_vis {
        Side::Right
    } else {
        Side::Left
    }
}

/// Mean visibility over the given landmark indices; 0.0 when any index is
/// missing from the frame (an absent landmark cannot be trusted).
fn mean_visibility(points: &[crate::types::Landmark], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for &i in indices {
        match points.get(i) {
            Some(p) => sum += p.visibility,
            None => return 0.0,
        }
    }
    sum / indices.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Landmark;

    fn frame_with_vis(left: f64, right: f64) -> LandmarkFrame {
        // Index 0 is the left set, index 1 the right set
        LandmarkFrame {
            timestamp_ms: 0,
            pose: vec![
                Landmark {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    visibility: left,
                },
                Landmark {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    visibility: right,
                },
            ],
            face: vec![],
            hand: vec![],
        }
    }

    fn landmarks() -> SideLandmarks {
        SideLandmarks {
            left: vec![0],
            right: vec![1],
        }
    }

    #[test]
    fn test_higher_confidence_side_wins_when_other_occluded() {
        let mut arbiter = VisibilityArbiter::new();
        // Left 0.8 vs right 0.3: left regardless of the angle values
        let choice = arbiter.arbitrate(&frame_with_vis(0.8, 0.3), &landmarks(), Some(10.0), Some(170.0));
        assert_eq!(choice.side, Some(Side::Left));
        assert!(!choice.low_visibility);
    }

    #[test]
    fn test_both_visible_larger_angle_wins() {
        let mut arbiter = VisibilityArbiter::new();
        let choice = arbiter.arbitrate(&frame_with_vis(0.9, 0.9), &landmarks(), Some(40.0), Some(95.0));
        assert_eq!(choice.side, Some(Side::Right));
    }

    #[test]
    fn test_neither_visible_raises_hint_after_run() {
        let mut arbiter = VisibilityArbiter::new();
        let frame = frame_with_vis(0.2, 0.4);

        for _ in 0..(LOW_VISIBILITY_RUN_LIMIT - 1) {
            let choice = arbiter.arbitrate(&frame, &landmarks(), None, None);
            assert!(!choice.low_visibility);
            // Still attributed to the less-bad side
            assert_eq!(choice.side, Some(Side::Right));
        }

        let choice = arbiter.arbitrate(&frame, &landmarks(), None, None);
        assert!(choice.low_visibility);
    }

    #[test]
    fn test_hint_clears_on_recovery() {
        let mut arbiter = VisibilityArbiter::new();
        let occluded = frame_with_vis(0.1, 0.1);
        for _ in 0..LOW_VISIBILITY_RUN_LIMIT {
            arbiter.arbitrate(&occluded, &landmarks(), None, None);
        }

        let choice = arbiter.arbitrate(&frame_with_vis(0.9, 0.1), &landmarks(), Some(30.0), None);
        assert!(!choice.low_visibility);
        assert_eq!(choice.side, Some(Side::Left));
    }

    #[test]
    fn test_missing_landmark_counts_as_invisible() {
        let mut arbiter = VisibilityArbiter::new();
        let frame = LandmarkFrame::default(); // no pose points at all
        let choice = arbiter.arbitrate(&frame, &landmarks(), None, None);
        // Tie at zero confidence resolves to left; run counter advanced
        assert_eq!(choice.side, Some(Side::Left));
        assert!(!choice.low_visibility);
    }
}
