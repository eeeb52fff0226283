//! Pipeline error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Monitor failed: {0}")]
    MonitorFailed(String),

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Transport error: {0}")]
    TransportFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreFailed(String),

    #[error("Model error: {0}")]
    Model(#[from] nvr_models::ModelError),

    #[error("Media error: {0}")]
    Media(#[from] nvr_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn stream_not_found(stream: impl Into<String>) -> Self {
        Self::StreamNotFound(stream.into())
    }

    pub fn monitor_failed(msg: impl Into<String>) -> Self {
        Self::MonitorFailed(msg.into())
    }

    pub fn recording_failed(msg: impl Into<String>) -> Self {
        Self::RecordingFailed(msg.into())
    }

    pub fn transport_failed(msg: impl Into<String>) -> Self {
        Self::TransportFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store_failed(msg: impl Into<String>) -> Self {
        Self::StoreFailed(msg.into())
    }

    /// Check if the failed operation may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_transient(),
            WorkerError::Io(_)
            | WorkerError::StoreFailed(_)
            | WorkerError::TransportFailed(_)
            | WorkerError::RecordingFailed(_) => true,
            _ => false,
        }
    }
}
