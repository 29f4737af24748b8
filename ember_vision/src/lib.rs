// THEORY:
// This file is the entry point for the `ember_vision` library crate. It exposes
// the temporal decision layer that sits on top of a per-frame fire and smoke
// detector: classification, debounce, edge-triggered alarm dispatch, and run
// history, plus the `Session` that ties them together for image, video, and
// camera runs.
//
// The detector, the frame decoder, and the alarm's speaker are collaborators
// behind traits (`Detector`, `FrameSource`, `AlarmSink`), so a front end can plug
// in a trained model, an OpenCV capture, or a scripted stand-in without touching
// the decision logic.

pub mod bus;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;

pub use bus::{ControlHandle, EventBus, FrameReport, RunEvent, Termination};
pub use config::{EmberConfig, InferenceFailurePolicy};
pub use core_modules::alarm::{AlarmDispatcher, AlarmSink, LogAlarm, SoundFileAlarm};
pub use core_modules::chroma_detector::{ChromaConfig, ChromaDetector};
pub use core_modules::classifier::{Classification, classify};
pub use core_modules::debounce::{Debouncer, EpisodeState, EpisodeStatus, required_frames};
pub use core_modules::detection::{BoundingBox, Detection, Detector};
pub use core_modules::frame_source::{
    CaptureGuard, Frame, FrameSequence, FrameSource, SourceInfo, StillImage,
};
pub use core_modules::history::{HistoryLog, HistoryRecord, SourceKind};
pub use error::{AlarmError, ConfigError, InferenceError, SessionError, SourceError};
pub use pipeline::{HazardPipeline, RunOutcome};
pub use session::{RunHandle, Session};
