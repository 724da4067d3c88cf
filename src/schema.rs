//! Wire schema for incoming detector frames
//!
//! The pose detector runs outside this crate and delivers frames as JSON:
//! a pose point list (33-point topology), an optional face mesh (468 points),
//! an optional hand (21 points), and a timestamp in seconds. This module
//! parses that shape and adapts it into the engine's [`LandmarkFrame`].

use crate::error::EngineError;
use crate::types::{Landmark, LandmarkFrame};
use serde::{Deserialize, Serialize};

/// Version of the raw frame schema this build understands
pub const SCHEMA_VERSION: &str = "1.0";

/// A detector point as it appears on the wire. Face and hand points carry no
/// visibility score; it defaults to fully visible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub visibility: Option<f64>,
}

impl From<RawPoint> for Landmark {
    fn from(p: RawPoint) -> Self {
        Landmark {
            x: p.x,
            y: p.y,
            z: p.z,
            visibility: p.visibility.unwrap_or(1.0),
        }
    }
}

/// One detector frame as delivered on the wire.
///
/// All point lists default to empty: a detection miss produces a frame with
/// no points, which is valid input ("no signal this frame").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFrame {
    /// Timestamp in seconds (fractional), as the detector reports it
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default, alias = "poseLandmarks")]
    pub pose: Vec<RawPoint>,
    #[serde(default, alias = "faceLandmarks")]
    pub face: Vec<RawPoint>,
    #[serde(default, alias = "handLandmarks")]
    pub hand: Vec<RawPoint>,
}

impl RawFrame {
    /// Parse a single frame from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(EngineError::Json)
    }

    /// Adapt into an engine frame. `fallback_ms` is used when the wire frame
    /// carries no timestamp (e.g. a replayed capture without clock data), so
    /// the caller supplies a monotonic substitute.
    pub fn into_frame(self, fallback_ms: u64) -> LandmarkFrame {
        let timestamp_ms = match self.timestamp {
            Some(secs) if secs.is_finite() && secs >= 0.0 => (secs * 1000.0).round() as u64,
            _ => fallback_ms,
        };
        LandmarkFrame {
            timestamp_ms,
            pose: self.pose.into_iter().map(Landmark::from).collect(),
            face: self.face.into_iter().map(Landmark::from).collect(),
            hand: self.hand.into_iter().map(Landmark::from).collect(),
        }
    }
}
