//! Session-finish: a single generic POST issued once every chunk is confirmed uploaded.

use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::UploadChunksConfig;
use crate::error::UploadError;
use crate::meta::FileMeta;
use crate::transport::{PostBody, PostRequest, Transport};

/// Issues the session-finish request once all chunks are complete.
pub struct SessionFinisher<R> {
    transport: Arc<dyn Transport>,
    config: Arc<dyn UploadChunksConfig>,
    _response: PhantomData<R>,
}

impl<R: DeserializeOwned> SessionFinisher<R> {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<dyn UploadChunksConfig>) -> Self {
        Self {
            transport,
            config,
            _response: PhantomData,
        }
    }

    pub async fn finish(&self, file_meta: &FileMeta) -> Result<R, UploadError> {
        let url = self.config.chunk_finish_url(file_meta);
        info!(target: "engine::finisher", %url, "finishing upload session");
        let request = PostRequest {
            url,
            body: PostBody::Json(serde_json::Value::Null),
            headers: self.config.headers(),
            progress: None,
        };
        let cancel = CancellationToken::new();
        let response = self
            .transport
            .post(request, &cancel)
            .await
            .map_err(|e| UploadError::FinishFailed(e.to_string()))?;
        serde_json::from_value(response.body).map_err(|e| UploadError::FinishFailed(e.to_string()))
    }
}
