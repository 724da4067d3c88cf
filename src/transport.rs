//! Best-effort payload forwarding
//!
//! The engine never talks to a network itself; the embedding application
//! plugs a sink in behind this trait. Sink failures are reported back to the
//! session, which counts them and carries on — a dropped frame upload must
//! never stall detection or lose a repetition.

use crate::error::EngineError;
use crate::types::{FramePayload, SessionSummary};

/// Destination for per-frame payloads and the end-of-session summary.
///
/// `submit_frame` may return a feedback string from the receiving side (a
/// coaching cue computed remotely); the session appends it to the feedback
/// log.
pub trait FrameSink {
    fn submit_frame(&mut self, payload: &FramePayload) -> Result<Option<String>, EngineError>;

    fn submit_summary(&mut self, summary: &SessionSummary) -> Result<(), EngineError>;
}

/// Discards everything; the default for offline sessions
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn submit_frame(&mut self, _payload: &FramePayload) -> Result<Option<String>, EngineError> {
        Ok(None)
    }

    fn submit_summary(&mut self, _summary: &SessionSummary) -> Result<(), EngineError> {
        Ok(())
    }
}

/// In-memory sink for tests and CLI replay: retains submissions, can serve
/// queued feedback, and can be told to fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<FramePayload>,
    pub summaries: Vec<SessionSummary>,
    /// Feedback strings handed out one per frame submission
    pub queued_feedback: Vec<String>,
    /// When set, every submission fails with a transport error
    pub failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for MemorySink {
    fn submit_frame(&mut self, payload: &FramePayload) -> Result<Option<String>, EngineError> {
        if self.failing {
            return Err(EngineError::Transport("sink unavailable".into()));
        }
        self.frames.push(payload.clone());
        if self.queued_feedback.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.queued_feedback.remove(0)))
        }
    }

    fn submit_summary(&mut self, summary: &SessionSummary) -> Result<(), EngineError> {
        if self.failing {
            return Err(EngineError::Transport("sink unavailable".into()));
        }
        self.summaries.push(summary.clone());
        Ok(())
    }
}
