use thiserror::Error;

/// Failures raised by a `FrameSource` while acquiring or reading frames.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The capture device or file could not be opened at all.
    #[error("source unavailable ({origin}): {message}")]
    Unavailable { origin: String, message: String },
    /// A frame read failed after the source had been opened.
    #[error("frame read failed after {frames_read} frames: {message}")]
    ReadFailure { frames_read: u64, message: String },
}

impl SourceError {
    pub fn unavailable(origin: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            origin: origin.into(),
            message: err.to_string(),
        }
    }

    pub fn read_failure(frames_read: u64, err: impl std::fmt::Display) -> Self {
        Self::ReadFailure {
            frames_read,
            message: err.to_string(),
        }
    }
}

/// The detector collaborator failed on a frame.
#[derive(Debug, Error)]
#[error("inference failed on frame {frame_index}: {message}")]
pub struct InferenceError {
    pub frame_index: u64,
    pub message: String,
}

impl InferenceError {
    pub fn new(frame_index: u64, err: impl std::fmt::Display) -> Self {
        Self {
            frame_index,
            message: err.to_string(),
        }
    }
}

/// Failures reported by an alarm sink.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("alarm asset missing: {path}")]
    MissingAsset { path: String },
    #[error("alarm playback failed: {message}")]
    Playback { message: String },
}

impl AlarmError {
    pub fn playback(err: impl std::fmt::Display) -> Self {
        Self::Playback {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error while {context}: {source}")]
    Yaml {
        context: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn yaml(context: &'static str, source: serde_yaml::Error) -> Self {
        Self::Yaml { context, source }
    }

    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the `Session` when a run cannot start or be joined.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("alarm asset missing, run not started: {path}")]
    MissingAsset { path: String },
    #[error(transparent)]
    SourceUnavailable(SourceError),
    /// The detector failed on a still image, so there is no result to record.
    #[error("image not analyzed: {message}")]
    InferenceFailed { message: String },
    #[error("another video or camera run is already active")]
    RunBusy,
    #[error("run task failed: {message}")]
    TaskFailed { message: String },
}

impl From<AlarmError> for SessionError {
    fn from(err: AlarmError) -> Self {
        match err {
            AlarmError::MissingAsset { path } => Self::MissingAsset { path },
            AlarmError::Playback { message } => Self::TaskFailed { message },
        }
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_asset_maps_to_session_error() {
        let err: SessionError = AlarmError::MissingAsset {
            path: "alarm.mp3".to_string(),
        }
        .into();
        assert!(matches!(err, SessionError::MissingAsset { ref path } if path == "alarm.mp3"));
        assert_eq!(err.to_string(), "alarm asset missing, run not started: alarm.mp3");
    }

    #[test]
    fn source_error_messages_carry_context() {
        let err = SourceError::read_failure(12, "device unplugged");
        assert_eq!(
            err.to_string(),
            "frame read failed after 12 frames: device unplugged"
        );
        let err = SourceError::unavailable("camera 0", "busy");
        assert_eq!(err.to_string(), "source unavailable (camera 0): busy");
    }
}
