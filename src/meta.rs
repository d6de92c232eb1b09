//! Server-reported session metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::UploadError;

/// Metadata returned by the server on session-open. Opaque fields the core doesn't need to
/// understand are retained in `extra` and echoed back verbatim on finish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub chunks: u32,
    pub chunk_size: u64,
    pub file_size: u64,
    #[serde(default)]
    pub uploaded_chunks: HashSet<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileMeta {
    /// Validate the invariants from the data model: `chunk_size * (chunks - 1) < file_size
    /// <= chunk_size * chunks`, and `uploaded_chunks` indices are all in range.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunks == 0 {
            return Err(UploadError::InvalidFileMeta(
                "chunks must be greater than zero".into(),
            ));
        }
        let chunks_minus_one = (self.chunks - 1) as u64;
        if !(self.chunk_size * chunks_minus_one < self.file_size
            && self.file_size <= self.chunk_size * self.chunks as u64)
        {
            return Err(UploadError::InvalidFileMeta(format!(
                "chunk_size={} chunks={} inconsistent with file_size={}",
                self.chunk_size, self.chunks, self.file_size
            )));
        }
        if let Some(bad) = self.uploaded_chunks.iter().find(|&&i| i >= self.chunks) {
            return Err(UploadError::InvalidFileMeta(format!(
                "uploaded_chunks contains out-of-range index {bad}"
            )));
        }
        Ok(())
    }
}

/// Request body sent to the session-open endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionRequest {
    pub file_name: String,
    pub file_size: u64,
    pub last_modified: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(chunks: u32, chunk_size: u64, file_size: u64, uploaded: &[u32]) -> FileMeta {
        FileMeta {
            chunks,
            chunk_size,
            file_size,
            uploaded_chunks: uploaded.iter().copied().collect(),
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn accepts_consistent_metadata() {
        assert!(meta(5, 100, 500, &[0, 1]).validate().is_ok());
        assert!(meta(5, 100, 450, &[]).validate().is_ok());
    }

    #[test]
    fn rejects_zero_chunks() {
        let err = meta(0, 100, 0, &[]).validate().unwrap_err();
        assert!(matches!(err, UploadError::InvalidFileMeta(_)));
    }

    #[test]
    fn rejects_file_size_inconsistent_with_chunk_layout() {
        let err = meta(5, 100, 1000, &[]).validate().unwrap_err();
        assert!(matches!(err, UploadError::InvalidFileMeta(_)));
    }

    #[test]
    fn rejects_out_of_range_uploaded_chunk_index() {
        let err = meta(5, 100, 500, &[5]).validate().unwrap_err();
        assert!(matches!(err, UploadError::InvalidFileMeta(_)));
    }
}
