//! Exercise configuration and the built-in registry
//!
//! An exercise is pure data: a signal selector describing how joint angles
//! combine into one scalar that grows with effort, a pair of thresholds with
//! hysteresis between them, a peak success range, and optional side landmark
//! sets for arbitration. The registry ships the built-in rehabilitation
//! catalogue and accepts custom configs, including from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::angles::pose;
use crate::error::EngineError;
use crate::types::{Joint, JointAngleSet};
use crate::visibility::SideLandmarks;

/// How the per-frame signal is derived from the joint angle set.
///
/// Every selector is oriented so the signal INCREASES with exercise effort;
/// exercises whose raw angle shrinks with effort (a squat closes the knee)
/// are rescaled rather than special-cased downstream. A selector evaluates to
/// `None` when its required angles are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalSelector {
    /// A single joint angle, used as-is
    Joint { joint: Joint },
    /// Absolute value of a signed angle (rotation in either direction)
    Magnitude { joint: Joint },
    /// Sign-flipped angle (one direction of a signed pair)
    Negated { joint: Joint },
    /// Larger of whichever sides are available
    MaxOf { left: Joint, right: Joint },
    /// Smaller of the two sides; both must be present
    MinOf { left: Joint, right: Joint },
    /// Mean of the two sides; both must be present
    MeanOf { left: Joint, right: Joint },
    /// The side whose signed value has the larger magnitude, optionally
    /// negated (flexion vs extension of a signed wrist pair)
    DominantSigned {
        left: Joint,
        right: Joint,
        negate: bool,
    },
    /// `offset + gain * inner`, for inverting or scaling a raw measure
    Rescaled {
        offset: f64,
        gain: f64,
        inner: Box<SignalSelector>,
    },
}

impl SignalSelector {
    /// Evaluate against a frame's angle set; `None` when required angles are
    /// absent this frame.
    pub fn evaluate(&self, angles: &JointAngleSet) -> Option<f64> {
        match self {
            SignalSelector::Joint { joint } => angles.get(*joint),
            SignalSelector::Magnitude { joint } => angles.get(*joint).map(f64::abs),
            SignalSelector::Negated { joint } => angles.get(*joint).map(|a| -a),
            SignalSelector::MaxOf { left, right } => {
                match (angles.get(*left), angles.get(*right)) {
                    (Some(l), Some(r)) => Some(l.max(r)),
                    (Some(v), None) | (None, Some(v)) => Some(v),
                    (None, None) => None,
                }
            }
            SignalSelector::MinOf { left, right } => {
                Some(angles.get(*left)?.min(angles.get(*right)?))
            }
            SignalSelector::MeanOf { left, right } => {
                Some((angles.get(*left)? + angles.get(*right)?) / 2.0)
            }
            SignalSelector::DominantSigned {
                left,
                right,
                negate,
            } => {
                let dominant = match (angles.get(*left), angles.get(*right)) {
                    (Some(l), Some(r)) => {
                        if r.abs() > l.abs() {
                            r
                        } else {
                            l
                        }
                    }
                    (Some(v), None) | (None, Some(v)) => v,
                    (None, None) => return None,
                };
                Some(if *negate { -dominant } else { dominant })
            }
            SignalSelector::Rescaled {
                offset,
                gain,
                inner,
            } => Some(offset + gain * inner.evaluate(angles)?),
        }
    }

    /// Per-side values for arbitration, oriented like the combined signal so
    /// the working side reads larger. `(None, None)` when the selector does
    /// not distinguish sides.
    pub fn side_angles(&self, angles: &JointAngleSet) -> (Option<f64>, Option<f64>) {
        match self {
            SignalSelector::MaxOf { left, right }
            | SignalSelector::MinOf { left, right }
            | SignalSelector::MeanOf { left, right } => (angles.get(*left), angles.get(*right)),
            SignalSelector::DominantSigned { left, right, .. } => {
                (angles.get(*left).map(f64::abs), angles.get(*right).map(f64::abs))
            }
            SignalSelector::Rescaled {
                offset,
                gain,
                inner,
            } => {
                let (l, r) = inner.side_angles(angles);
                (
                    l.map(|v| offset + gain * v),
                    r.map(|v| offset + gain * v),
                )
            }
            _ => (None, None),
        }
    }
}

/// Full description of one exercise. Thresholds are in signal space, after
/// the selector's orientation, so `down_threshold < success_threshold` holds
/// for every exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseConfig {
    /// Stable identifier (`"squat"`, `"neck_rotation_left"`, ...)
    pub id: String,
    /// Human-readable name for listings
    pub name: String,
    pub selector: SignalSelector,
    /// Landmark sets for side arbitration; absent for bilateral exercises
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_landmarks: Option<SideLandmarks>,
    /// At or below: resting position (rep finalizes here)
    pub down_threshold: f64,
    /// At or above: up excursion begins
    pub success_threshold: f64,
    /// Peak must land in [success_min, success_max] for the rep to count
    pub success_min: f64,
    pub success_max: f64,
    /// How long the signal must stay above the success threshold for the
    /// hold to be recorded as satisfied
    #[serde(default)]
    pub hold_ms: u64,
    /// Cycles shorter than this are discarded as jitter; disabled by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cycle_ms: Option<u64>,
}

impl ExerciseConfig {
    /// Reject configurations the state machine cannot run correctly.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.is_empty() {
            return Err(EngineError::Config("exercise id must not be empty".into()));
        }
        if !self.down_threshold.is_finite() || !self.success_threshold.is_finite() {
            return Err(EngineError::Config(format!(
                "{}: thresholds must be finite",
                self.id
            )));
        }
        if self.down_threshold >= self.success_threshold {
            return Err(EngineError::Config(format!(
                "{}: down threshold ({}) must be below success threshold ({})",
                self.id, self.down_threshold, self.success_threshold
            )));
        }
        if self.success_min > self.success_max {
            return Err(EngineError::Config(format!(
                "{}: success range is inverted ({} > {})",
                self.id, self.success_min, self.success_max
            )));
        }
        Ok(())
    }

    /// Parse and validate a config from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: ExerciseConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Catalogue of known exercises, keyed by id
#[derive(Debug, Clone, Default)]
pub struct ExerciseRegistry {
    exercises: BTreeMap<String, ExerciseConfig>,
}

impl ExerciseRegistry {
    /// Empty registry for fully custom catalogues
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in rehabilitation catalogue
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for config in builtin_exercises() {
            // Built-in table is validated by tests; insertion cannot fail
            registry.exercises.insert(config.id.clone(), config);
        }
        registry
    }

    pub fn register(&mut self, config: ExerciseConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.exercises.insert(config.id.clone(), config);
        Ok(())
    }

    pub fn register_json(&mut self, json: &str) -> Result<(), EngineError> {
        self.register(ExerciseConfig::from_json(json)?)
    }

    pub fn get(&self, id: &str) -> Result<&ExerciseConfig, EngineError> {
        self.exercises
            .get(id)
            .ok_or_else(|| EngineError::UnknownExercise(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.exercises.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseConfig> {
        self.exercises.values()
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

fn arm_landmarks() -> SideLandmarks {
    SideLandmarks {
        left: vec![pose::LEFT_SHOULDER, pose::LEFT_ELBOW, pose::LEFT_WRIST],
        right: vec![pose::RIGHT_SHOULDER, pose::RIGHT_ELBOW, pose::RIGHT_WRIST],
    }
}

fn leg_landmarks() -> SideLandmarks {
    SideLandmarks {
        left: vec![pose::LEFT_HIP, pose::LEFT_KNEE, pose::LEFT_ANKLE],
        right: vec![pose::RIGHT_HIP, pose::RIGHT_KNEE, pose::RIGHT_ANKLE],
    }
}

fn inverted(offset: f64, inner: SignalSelector) -> SignalSelector {
    SignalSelector::Rescaled {
        offset,
        gain: -1.0,
        inner: Box::new(inner),
    }
}

/// The built-in exercise table. Thresholds are in signal space: bend
/// exercises (squat, pushup, flexions) use `180 - angle` so that deeper bend
/// means a larger signal, head rotations use magnitude or a signed direction,
/// and thumb opposition maps closing distance onto a 0-100 scale.
fn builtin_exercises() -> Vec<ExerciseConfig> {
    let mut table = Vec::new();

    let mut add = |id: &str,
                   name: &str,
                   selector: SignalSelector,
                   side_landmarks: Option<SideLandmarks>,
                   down: f64,
                   success: f64,
                   max: f64| {
        table.push(ExerciseConfig {
            id: id.to_string(),
            name: name.to_string(),
            selector,
            side_landmarks,
            down_threshold: down,
            success_threshold: success,
            success_min: success,
            success_max: max,
            hold_ms: 0,
            min_cycle_ms: None,
        });
    };

    // Lower body, bilateral
    add(
        "squat",
        "Squat",
        inverted(
            180.0,
            SignalSelector::MeanOf {
                left: Joint::LeftKnee,
                right: Joint::RightKnee,
            },
        ),
        None,
        20.0,
        90.0,
        180.0,
    );
    // Same movement signal as the squat, prescribed under its own name
    add(
        "knee_bend",
        "Knee Bend",
        inverted(
            180.0,
            SignalSelector::MeanOf {
                left: Joint::LeftKnee,
                right: Joint::RightKnee,
            },
        ),
        None,
        20.0,
        90.0,
        180.0,
    );
    add(
        "pushup",
        "Push-up",
        inverted(
            180.0,
            SignalSelector::MeanOf {
                left: Joint::LeftElbow,
                right: Joint::RightElbow,
            },
        ),
        None,
        20.0,
        90.0,
        180.0,
    );

    // Shoulder, side-arbitrated
    for (id, name) in [
        ("shoulder_raise", "Shoulder Raise"),
        ("shoulder_flexion", "Shoulder Flexion"),
        ("shoulder_abduction", "Shoulder Abduction"),
    ] {
        add(
            id,
            name,
            SignalSelector::MaxOf {
                left: Joint::LeftShoulder,
                right: Joint::RightShoulder,
            },
            Some(arm_landmarks()),
            35.0,
            85.0,
            180.0,
        );
    }

    // Elbow
    add(
        "elbow_flexion",
        "Elbow Flexion",
        inverted(
            180.0,
            SignalSelector::MinOf {
                left: Joint::LeftElbow,
                right: Joint::RightElbow,
            },
        ),
        Some(arm_landmarks()),
        20.0,
        120.0,
        180.0,
    );
    add(
        "elbow_extension",
        "Elbow Extension",
        SignalSelector::MaxOf {
            left: Joint::LeftElbow,
            right: Joint::RightElbow,
        },
        Some(arm_landmarks()),
        100.0,
        160.0,
        180.0,
    );

    // Knee
    add(
        "knee_flexion",
        "Knee Flexion",
        inverted(
            180.0,
            SignalSelector::MinOf {
                left: Joint::LeftKnee,
                right: Joint::RightKnee,
            },
        ),
        Some(leg_landmarks()),
        15.0,
        110.0,
        180.0,
    );
    add(
        "knee_extension",
        "Knee Extension",
        SignalSelector::MaxOf {
            left: Joint::LeftKnee,
            right: Joint::RightKnee,
        },
        Some(leg_landmarks()),
        110.0,
        165.0,
        180.0,
    );

    // Hip
    add(
        "hip_flexion",
        "Hip Flexion",
        inverted(
            180.0,
            SignalSelector::MinOf {
                left: Joint::LeftHip,
                right: Joint::RightHip,
            },
        ),
        Some(leg_landmarks()),
        15.0,
        60.0,
        180.0,
    );
    add(
        "hip_abduction",
        "Hip Abduction",
        SignalSelector::MaxOf {
            left: Joint::LeftHipAbduction,
            right: Joint::RightHipAbduction,
        },
        Some(leg_landmarks()),
        8.0,
        20.0,
        90.0,
    );
    add(
        "hip_adduction",
        "Hip Adduction",
        inverted(
            90.0,
            SignalSelector::MaxOf {
                left: Joint::LeftHipAbduction,
                right: Joint::RightHipAbduction,
            },
        ),
        Some(leg_landmarks()),
        75.0,
        82.0,
        90.0,
    );

    // Neck (head orientation signals, no side landmarks)
    add(
        "neck_rotation",
        "Neck Rotation",
        SignalSelector::Magnitude {
            joint: Joint::HeadYaw,
        },
        None,
        10.0,
        45.0,
        90.0,
    );
    add(
        "neck_rotation_left",
        "Neck Rotation (Left)",
        SignalSelector::Negated {
            joint: Joint::HeadYaw,
        },
        None,
        10.0,
        35.0,
        90.0,
    );
    add(
        "neck_rotation_right",
        "Neck Rotation (Right)",
        SignalSelector::Joint {
            joint: Joint::HeadYaw,
        },
        None,
        10.0,
        35.0,
        90.0,
    );
    add(
        "neck_flexion",
        "Neck Flexion",
        SignalSelector::Negated {
            joint: Joint::HeadPitch,
        },
        None,
        10.0,
        20.0,
        90.0,
    );
    add(
        "neck_extension",
        "Neck Extension",
        SignalSelector::Joint {
            joint: Joint::HeadPitch,
        },
        None,
        10.0,
        20.0,
        90.0,
    );
    add(
        "neck_lateral_left",
        "Neck Lateral Tilt (Left)",
        SignalSelector::Negated {
            joint: Joint::HeadRoll,
        },
        None,
        8.0,
        20.0,
        90.0,
    );
    add(
        "neck_lateral_right",
        "Neck Lateral Tilt (Right)",
        SignalSelector::Joint {
            joint: Joint::HeadRoll,
        },
        None,
        8.0,
        20.0,
        90.0,
    );

    // Wrist (signed pair; dominant magnitude picks the working hand)
    add(
        "wrist_flexion",
        "Wrist Flexion",
        SignalSelector::DominantSigned {
            left: Joint::LeftWristSigned,
            right: Joint::RightWristSigned,
            negate: true,
        },
        Some(arm_landmarks()),
        8.0,
        25.0,
        180.0,
    );
    add(
        "wrist_extension",
        "Wrist Extension",
        SignalSelector::DominantSigned {
            left: Joint::LeftWristSigned,
            right: Joint::RightWristSigned,
            negate: false,
        },
        Some(arm_landmarks()),
        8.0,
        25.0,
        180.0,
    );

    // Hand (hand model signals)
    add(
        "finger_mp_flexion",
        "Finger MP Flexion",
        SignalSelector::Joint {
            joint: Joint::McpFlexionAvg,
        },
        None,
        10.0,
        40.0,
        180.0,
    );
    add(
        "finger_ip_flexion",
        "Finger IP Flexion",
        SignalSelector::Joint {
            joint: Joint::PipFlexionAvg,
        },
        None,
        10.0,
        40.0,
        180.0,
    );
    add(
        "finger_mp_extension",
        "Finger MP Extension",
        inverted(
            180.0,
            SignalSelector::Joint {
                joint: Joint::McpFlexionAvg,
            },
        ),
        None,
        155.0,
        170.0,
        180.0,
    );
    add(
        "finger_thumb_opposition",
        "Thumb Opposition",
        // Normalized tip distance mapped to 0-100: closing from 0.12 to 0.08
        // moves the signal from 40 to 60
        SignalSelector::Rescaled {
            offset: 100.0,
            gain: -500.0,
            inner: Box::new(SignalSelector::Joint {
                joint: Joint::ThumbOppDistance,
            }),
        },
        None,
        40.0,
        60.0,
        100.0,
    );

    table
}
