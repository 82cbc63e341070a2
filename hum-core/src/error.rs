//! Error types for the hum core.

use thiserror::Error;

/// Reasons a raw sample from the capture side is refused by the engine.
///
/// These never escape `on_sample`: a refused sample is logged and skipped so
/// one bad reading cannot break segmentation of the rest of the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("frequency must be positive, got {0} Hz")]
    NonPositiveFrequency(f32),

    #[error("frequency is not a finite number")]
    NonFiniteFrequency,

    #[error("amplitude {0} is outside the accepted range")]
    AmplitudeOutOfRange(f32),

    #[error("timestamp is not a finite number")]
    NonFiniteTimestamp,

    #[error("timestamp went backwards: {current}s after {previous}s")]
    TimestampRegressed { previous: f64, current: f64 },
}

/// Errors raised by the audio collaborators, persistence and session control.
#[derive(Debug, Error)]
pub enum HumError {
    #[error("audio device error: {0}")]
    Audio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no recording session is running")]
    NotRecording,

    #[error("a recording session is already running")]
    AlreadyRecording,
}

/// Result type for hum operations.
pub type HumResult<T> = Result<T, HumError>;

impl From<cpal::BuildStreamError> for HumError {
    fn from(e: cpal::BuildStreamError) -> Self {
        HumError::Audio(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for HumError {
    fn from(e: cpal::PlayStreamError) -> Self {
        HumError::Audio(e.to_string())
    }
}

impl From<cpal::PauseStreamError> for HumError {
    fn from(e: cpal::PauseStreamError) -> Self {
        HumError::Audio(e.to_string())
    }
}

impl From<cpal::DeviceNameError> for HumError {
    fn from(e: cpal::DeviceNameError) -> Self {
        HumError::Audio(e.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for HumError {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        HumError::Audio(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for HumError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        HumError::Audio(e.to_string())
    }
}
