//! Error types for the repscan engine

use thiserror::Error;

/// Errors that can occur while configuring or driving a session.
///
/// Two recoverable conditions are deliberately not errors: an angle the
/// extractor cannot compute is simply absent from the frame's
/// `JointAngleSet`, and an uncalibrated session falls back to the default
/// fixed normalization scale. Neither aborts frame processing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid exercise config: {0}")]
    Config(String),

    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("Session already ended; no further frames accepted")]
    SessionEnded,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse frame: {0}")]
    Parse(String),
}
