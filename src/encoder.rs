//! Payload encoding with producer provenance
//!
//! Every payload that leaves the engine is stamped with who produced it
//! (engine name, version, unique instance id), which session and exercise it
//! belongs to, and when it was computed, so a backend can reconcile frames
//! from many concurrent clients.

use chrono::Utc;
use uuid::Uuid;

use crate::types::{
    Accuracy, FramePayload, JointAngleSet, Phase, Producer, RepResult, SessionSummary,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};

/// Stamps session identity and provenance onto outgoing payloads
#[derive(Debug, Clone)]
pub struct EventEncoder {
    producer: Producer,
    session_id: String,
    exercise_id: String,
    started_at_utc: String,
}

impl EventEncoder {
    /// New encoder for one session; generates the session and instance ids
    /// and records the start time.
    pub fn new(exercise_id: &str) -> Self {
        EventEncoder {
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: Uuid::new_v4().to_string(),
            },
            session_id: Uuid::new_v4().to_string(),
            exercise_id: exercise_id.to_string(),
            started_at_utc: Utc::now().to_rfc3339(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn exercise_id(&self) -> &str {
        &self.exercise_id
    }

    pub fn frame_payload(
        &self,
        frame_index: u64,
        timestamp_ms: u64,
        angles: &JointAngleSet,
        stage: Phase,
        rep_count: u32,
    ) -> FramePayload {
        FramePayload {
            producer: self.producer.clone(),
            session_id: self.session_id.clone(),
            exercise_id: self.exercise_id.clone(),
            frame_index,
            timestamp_ms,
            angles: angles.clone(),
            stage,
            rep_count,
            computed_at_utc: Utc::now().to_rfc3339(),
        }
    }

    pub fn summary(
        &self,
        frames_processed: u64,
        reps: &[RepResult],
        accuracy: Accuracy,
        latest_feedback: Vec<String>,
    ) -> SessionSummary {
        let successes = reps.iter().filter(|r| r.success).count() as u32;
        SessionSummary {
            producer: self.producer.clone(),
            session_id: self.session_id.clone(),
            exercise_id: self.exercise_id.clone(),
            started_at_utc: self.started_at_utc.clone(),
            ended_at_utc: Utc::now().to_rfc3339(),
            frames_processed,
            total_reps: reps.len() as u32,
            successes,
            fails: reps.len() as u32 - successes,
            accuracy,
            reps: reps.to_vec(),
            latest_feedback,
        }
    }
}
