//! Per-user range-of-motion calibration
//!
//! A patient's usable range rarely matches the textbook range, so live
//! progress and angle accuracy are normalized against captured rest and peak
//! positions when available. The manager keeps a short rolling buffer of the
//! active signal; a capture snapshots the buffer average, smoothing out
//! detector jitter at the moment of capture.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Rolling buffer length backing capture averages (about two seconds at 30fps)
pub const CALIBRATION_BUFFER_FRAMES: usize = 60;

/// Normalization denominator used until rest and peak are captured
pub const DEFAULT_TARGET_SCALE_DEG: f64 = 90.0;

/// Fraction of the calibrated span where the auto success threshold lands
pub const DEFAULT_SUCCESS_RATIO: f64 = 0.85;

/// Calibration state for one session. Serializable so captured positions can
/// be saved and restored across sessions; the live buffer is transient and
/// not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationManager {
    #[serde(skip)]
    buffer: VecDeque<f64>,
    rest: Option<f64>,
    mid: Option<f64>,
    peak: Option<f64>,
    success_ratio: f64,
    ratio_overridden: bool,
    /// The auto threshold fires once per arming; rearmed by a ratio change
    /// or a calibration reset
    auto_applied: bool,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        CalibrationManager {
            buffer: VecDeque::with_capacity(CALIBRATION_BUFFER_FRAMES),
            rest: None,
            mid: None,
            peak: None,
            success_ratio: DEFAULT_SUCCESS_RATIO,
            ratio_overridden: false,
            auto_applied: false,
        }
    }
}

impl CalibrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current frame's signal into the rolling buffer
    pub fn push(&mut self, signal: f64) {
        self.buffer.push_back(signal);
        while self.buffer.len() > CALIBRATION_BUFFER_FRAMES {
            self.buffer.pop_front();
        }
    }

    fn buffer_average(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.iter().sum::<f64>() / self.buffer.len() as f64)
    }

    /// Snapshot the buffered average as the rest position
    pub fn capture_rest(&mut self) -> Option<f64> {
        let avg = self.buffer_average()?;
        self.rest = Some(avg);
        Some(avg)
    }

    /// Snapshot the buffered average as the mid position (informational)
    pub fn capture_mid(&mut self) -> Option<f64> {
        let avg = self.buffer_average()?;
        self.mid = Some(avg);
        Some(avg)
    }

    /// Snapshot the buffered average as the peak position
    pub fn capture_peak(&mut self) -> Option<f64> {
        let avg = self.buffer_average()?;
        self.peak = Some(avg);
        Some(avg)
    }

    pub fn rest(&self) -> Option<f64> {
        self.rest
    }

    pub fn mid(&self) -> Option<f64> {
        self.mid
    }

    pub fn peak(&self) -> Option<f64> {
        self.peak
    }

    pub fn success_ratio(&self) -> f64 {
        self.success_ratio
    }

    /// Override the success-threshold ratio. Rearms the one-shot auto
    /// threshold so the new ratio takes effect on the next frame.
    pub fn set_success_ratio(&mut self, ratio: f64) -> Result<(), EngineError> {
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(EngineError::Config(format!(
                "success ratio must be in (0, 1], got {ratio}"
            )));
        }
        self.success_ratio = ratio;
        self.ratio_overridden = true;
        self.auto_applied = false;
        Ok(())
    }

    /// Calibrated span (peak - rest), when both positions are captured and
    /// ordered sensibly
    pub fn span(&self) -> Option<f64> {
        match (self.rest, self.peak) {
            (Some(rest), Some(peak)) if peak > rest => Some(peak - rest),
            _ => None,
        }
    }

    /// Denominator for angle accuracy: the calibrated span, or the fixed
    /// default before calibration
    pub fn target_scale(&self) -> f64 {
        self.span().unwrap_or(DEFAULT_TARGET_SCALE_DEG)
    }

    /// Live completion percentage for the current signal, in [0, 100]
    pub fn live_percent(&self, signal: f64) -> f64 {
        match (self.rest, self.span()) {
            (Some(rest), Some(span)) => (((signal - rest) / span).clamp(0.0, 1.0)) * 100.0,
            _ => (signal / DEFAULT_TARGET_SCALE_DEG).clamp(0.0, 1.0) * 100.0,
        }
    }

    /// One-shot auto-derived success threshold: `rest + ratio * span`, fired
    /// the first time both positions are available (or after rearming).
    /// Returns `None` on every subsequent call.
    pub fn take_auto_threshold(&mut self) -> Option<f64> {
        if self.auto_applied {
            return None;
        }
        let rest = self.rest?;
        let span = self.span()?;
        self.auto_applied = true;
        Some(rest + self.success_ratio * span)
    }

    /// Drop captured positions and rearm the auto threshold; the rolling
    /// buffer and any overridden ratio survive.
    pub fn reset_captures(&mut self) {
        self.rest = None;
        self.mid = None;
        self.peak = None;
        self.auto_applied = false;
    }
}
