use thiserror::Error;

/// Errors from the HTTP boundary (analysis and transcription endpoints)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),
}

/// Errors from the task lifecycle
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task creation failed; no task was started and the prior status was
    /// restored
    #[error("submission failed: {0}")]
    Submission(#[from] ApiError),

    /// An analysis task is already in flight
    #[error("an analysis task is already running")]
    TaskActive,

    /// Submitting while a recording is active is rejected at the boundary
    #[error("cannot submit while recording")]
    RecordingActive,
}

/// Errors from the audio capture session
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Microphone access denied or no usable input device
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    /// Starting a recording while an analysis task is running is rejected
    /// at the boundary
    #[error("cannot record while an analysis task is running")]
    AnalysisActive,

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}

/// Errors from exporting the resolved document
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no resolved document to export")]
    NoDocument,

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}
