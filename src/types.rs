//! Core types for the repscan engine
//!
//! This module defines the data structures that flow through each stage of the
//! per-frame pipeline: landmark frames, joint angle sets, repetition results,
//! session metrics, and the JSON payloads forwarded to a backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body side chosen for a repetition cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// A single tracked body point with normalized coordinates and a visibility
/// confidence in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    /// Detector confidence that the point is actually visible (0-1)
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

fn default_visibility() -> f64 {
    1.0
}

/// One frame of labeled body points, produced by an external pose detector.
///
/// A frame with empty point lists is valid and means "no signal this frame".
/// Immutable once received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Frame timestamp in milliseconds. Drives hold timing, so replaying the
    /// same frames yields the same results regardless of wall clock.
    pub timestamp_ms: u64,
    /// Full-body pose points (33-point topology)
    #[serde(default)]
    pub pose: Vec<Landmark>,
    /// Face mesh points (468-point topology), when a face model runs
    #[serde(default)]
    pub face: Vec<Landmark>,
    /// Hand points (21-point topology), when a hand model runs
    #[serde(default)]
    pub hand: Vec<Landmark>,
}

/// Named joint-angle signals derived per frame.
///
/// Serialized names match what the upstream detector and backend already use
/// (`leftShoulder`, `headYaw`, `mcpFlexionAvg`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Joint {
    LeftElbow,
    RightElbow,
    LeftKnee,
    RightKnee,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
    LeftWristSigned,
    RightWristSigned,
    LeftHipAbduction,
    RightHipAbduction,
    HeadYaw,
    HeadPitch,
    HeadRoll,
    McpFlexionAvg,
    PipFlexionAvg,
    ThumbOppDistance,
}

/// Joint angles for one frame, in degrees.
///
/// Three-point joint angles live in [0,180]; head orientation angles in
/// [-90,90]; wrist bend angles are signed in [-180,180];
/// `ThumbOppDistance` is a unitless normalized distance, not an angle.
///
/// A joint the extractor could not compute is absent, never zero: absence
/// must read as "signal unavailable" downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointAngleSet {
    angles: BTreeMap<Joint, f64>,
}

impl JointAngleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, joint: Joint, degrees: f64) {
        self.angles.insert(joint, degrees);
    }

    pub fn get(&self, joint: Joint) -> Option<f64> {
        self.angles.get(&joint).copied()
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, f64)> + '_ {
        self.angles.iter().map(|(j, a)| (*j, *a))
    }
}

/// Repetition state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Resting / initial position (signal at or below the down threshold)
    Down,
    /// Between the down and success thresholds; display-only label
    Transition,
    /// Success threshold crossed; an excursion is in progress
    Up,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Down => "down",
            Phase::Transition => "transition",
            Phase::Up => "up",
        }
    }
}

/// One finalized repetition. Appended to the session's ordered history and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepResult {
    /// Monotonic sequence number within the session, starting at 1
    pub seq: u32,
    /// Largest signal value observed during the up excursion (degrees)
    pub peak: f64,
    /// Whether the peak landed inside the configured success range
    pub success: bool,
    /// Side attributed to this cycle, when the exercise is side-specific
    pub side: Option<Side>,
    /// Whether the signal stayed above the success threshold for the
    /// configured hold duration. Recorded, but does not gate `success`.
    pub hold_satisfied: bool,
    /// Wall duration of the full up-down cycle, from frame timestamps
    pub cycle_ms: u64,
}

/// Success/fail totals for the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepCounts {
    pub success: u32,
    pub fail: u32,
}

impl RepCounts {
    pub fn total(&self) -> u32 {
        self.success + self.fail
    }
}

/// Running accuracy metrics, both recomputed after every finalized rep
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    /// successes / total attempts, as a percentage
    pub ratio: f64,
    /// Mean of each rep's peak normalized against the calibrated or default
    /// target scale, each term clamped to [0,1], as a percentage
    pub angle_based: f64,
}

/// Aggregate session metrics, recomputed after each RepResult append
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub reps: RepCounts,
    pub accuracy: Accuracy,
    /// Most recent feedback strings, oldest first (bounded log)
    pub feedback: Vec<String>,
}

/// Event emitted for every processed frame, consumed by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    /// Current phase label
    pub stage: Phase,
    /// Live completion percentage (0-100) of the current signal against the
    /// calibrated or default scale
    pub live_percent: f64,
    /// Signal value this frame, absent when landmarks were insufficient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<f64>,
    /// Side the visibility arbiter chose this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_side: Option<Side>,
    /// Set after a sustained run of low-visibility frames; the caller should
    /// prompt the user to adjust their position
    pub low_visibility: bool,
    pub reps: RepCounts,
    pub accuracy: Accuracy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<String>,
    /// Present only on the frame that finalized a repetition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_rep: Option<RepResult>,
}

/// Producer metadata stamped on forwarded payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Per-frame payload forwarded to the backend, mirroring what the session
/// API's `submit-frame` endpoint expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    pub producer: Producer,
    pub session_id: String,
    pub exercise_id: String,
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub angles: JointAngleSet,
    pub stage: Phase,
    pub rep_count: u32,
    pub computed_at_utc: String,
}

/// End-of-session aggregate forwarded to the backend and returned to the
/// caller from `ExerciseSession::end`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub producer: Producer,
    pub session_id: String,
    pub exercise_id: String,
    pub started_at_utc: String,
    pub ended_at_utc: String,
    pub frames_processed: u64,
    pub total_reps: u32,
    pub successes: u32,
    pub fails: u32,
    pub accuracy: Accuracy,
    /// Full ordered repetition history
    pub reps: Vec<RepResult>,
    /// Most recent feedback strings (bounded, oldest first)
    pub latest_feedback: Vec<String>,
}
