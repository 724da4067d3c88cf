//! Repscan - On-device repetition detection and scoring for pose-tracked
//! rehabilitation exercises
//!
//! Repscan turns landmark frames from an external pose detector into
//! repetition counts and accuracy metrics through a deterministic pipeline:
//! angle extraction → side arbitration → calibration → repetition state
//! machine → scoring → payload forwarding.
//!
//! ## Modules
//!
//! - **Session**: per-exercise lifecycle, one frame in / one event out
//! - **Config**: the built-in exercise catalogue and custom configs
//! - **Transport**: best-effort forwarding seam for frame/summary payloads

pub mod angles;
pub mod calibration;
pub mod config;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod schema;
pub mod scoring;
pub mod session;
pub mod transport;
pub mod types;
pub mod visibility;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{ExerciseConfig, ExerciseRegistry, SignalSelector};
pub use error::EngineError;
pub use session::ExerciseSession;
pub use transport::{FrameSink, MemorySink, NullSink};

// Schema exports
pub use schema::{RawFrame, SCHEMA_VERSION};

// Event and payload exports
pub use types::{FrameEvent, LandmarkFrame, Phase, RepResult, SessionMetrics, SessionSummary};

/// Engine version embedded in all forwarded payloads
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for forwarded payloads
pub const PRODUCER_NAME: &str = "repscan";
