//! Error taxonomy for the upload engine.

use thiserror::Error;

/// Errors surfaced by the upload engine, matching the kinds a caller can act on.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The session-open request failed or returned a malformed response. Terminal.
    #[error("failed to open upload session: {0}")]
    SessionOpenFailed(String),

    /// The `FileMeta` returned by the server was inconsistent with the blob being uploaded.
    #[error("invalid file metadata: {0}")]
    InvalidFileMeta(String),

    /// A single chunk upload attempt failed. Counted toward the dispatcher's error threshold,
    /// never surfaced to the caller on its own.
    #[error("chunk {index} upload failed: {source}")]
    ChunkUploadFailed {
        index: u32,
        #[source]
        source: TransportError,
    },

    /// The per-run error threshold was reached. Retryable via `UploadEngine::retry`.
    #[error("{0} chunk(s) failed in this run, exceeding the error threshold")]
    MultipleChunkUploadError(usize),

    /// The session-finish request failed. Terminal.
    #[error("failed to finish upload session: {0}")]
    FinishFailed(String),

    /// The caller aborted the upload. Never surfaced as an `Error` event; only used internally
    /// to distinguish abort from other terminal conditions.
    #[error("upload aborted")]
    Aborted,
}

impl UploadError {
    /// Whether this error can be resolved by calling `UploadEngine::retry`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::MultipleChunkUploadError(_))
    }

    /// Whether this error represents a deliberate user abort rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, UploadError::Aborted)
    }
}

/// Errors returned by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransportError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => TransportError::Other(err.to_string()),
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
