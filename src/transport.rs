//! The HTTP capability the engine depends on, abstracted behind a trait so the core
//! never talks to `reqwest` directly.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Receives byte-level progress callbacks while a request body streams out.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, loaded: u64);
}

/// Body of an outgoing POST request.
pub enum PostBody {
    Json(serde_json::Value),
    Bytes(Bytes),
}

/// A single outgoing request.
pub struct PostRequest {
    pub url: String,
    pub body: PostBody,
    pub headers: HashMap<String, String>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl PostRequest {
    pub fn json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            body: PostBody::Json(body),
            headers: HashMap::new(),
            progress: None,
        }
    }

    pub fn bytes(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            url: url.into(),
            body: PostBody::Bytes(body),
            headers: HashMap::new(),
            progress: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Response to a successful (2xx) request.
pub struct PostResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// The capability the core upload pipeline depends on. Implementations must honor
/// `cancel`, aborting the in-flight request when it is triggered.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        request: PostRequest,
        cancel: &CancellationToken,
    ) -> Result<PostResponse, TransportError>;
}
