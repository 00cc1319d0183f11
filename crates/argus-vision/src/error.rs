//! Vision error types.

use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur in detection, capture and frame handling.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("Unsupported source URL: {0}")]
    BadSource(String),

    #[error("Failed to open source: {0}")]
    SourceOpen(String),

    #[error("Frame read failed: {0}")]
    SourceRead(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl VisionError {
    pub fn backend_init(msg: impl Into<String>) -> Self {
        Self::BackendInit(msg.into())
    }

    pub fn source_open(msg: impl Into<String>) -> Self {
        Self::SourceOpen(msg.into())
    }

    pub fn source_read(msg: impl Into<String>) -> Self {
        Self::SourceRead(msg.into())
    }

    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }
}
