//! Memoized session-open: a single cached async computation instead of a database-backed
//! resume lookup, since resumption here relies entirely on the server's reported
//! `uploaded_chunks`.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::UploadChunksConfig;
use crate::error::UploadError;
use crate::meta::{FileMeta, OpenSessionRequest};
use crate::transport::{PostBody, PostRequest, Transport};

/// Opens an upload session exactly once and caches the result for the lifetime of the engine.
pub struct SessionOpener {
    transport: Arc<dyn Transport>,
    config: Arc<dyn UploadChunksConfig>,
    cache: OnceCell<FileMeta>,
}

impl SessionOpener {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<dyn UploadChunksConfig>) -> Self {
        Self {
            transport,
            config,
            cache: OnceCell::new(),
        }
    }

    /// Return the cached `FileMeta`, opening the session on first call.
    pub async fn open(&self, request: OpenSessionRequest) -> Result<FileMeta, UploadError> {
        self.cache
            .get_or_try_init(|| async {
                info!(
                    target: "engine::opener",
                    file_name = %request.file_name,
                    file_size = request.file_size,
                    "opening upload session"
                );
                let body = serde_json::to_value(&request)
                    .map_err(|e| UploadError::SessionOpenFailed(e.to_string()))?;
                let post = PostRequest {
                    url: self.config.chunk_start_url(),
                    body: PostBody::Json(body),
                    headers: self.config.headers(),
                    progress: None,
                };
                let cancel = tokio_util::sync::CancellationToken::new();
                let response = self
                    .transport
                    .post(post, &cancel)
                    .await
                    .map_err(|e| UploadError::SessionOpenFailed(e.to_string()))?;
                let file_meta: FileMeta = serde_json::from_value(response.body)
                    .map_err(|e| UploadError::SessionOpenFailed(e.to_string()))?;
                file_meta.validate()?;
                debug!(
                    target: "engine::opener",
                    chunks = file_meta.chunks,
                    chunk_size = file_meta.chunk_size,
                    already_uploaded = file_meta.uploaded_chunks.len(),
                    "session opened"
                );
                Ok(file_meta)
            })
            .await
            .map(|meta| meta.clone())
    }
}
