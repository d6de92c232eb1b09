//! Default [`Transport`] implementation backed by `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::{Body, Client};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{PostBody, PostRequest, PostResponse, Transport};

/// Streams a fixed buffer of bytes out in small pieces, reporting progress and checking a
/// cancellation token on every poll so an in-flight upload can be interrupted mid-body.
struct ProgressBodyStream {
    data: Bytes,
    offset: usize,
    chunk: usize,
    progress: Option<std::sync::Arc<dyn crate::transport::ProgressSink>>,
    cancel: CancellationToken,
}

impl Stream for ProgressBodyStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "upload cancelled",
            ))));
        }
        if this.offset >= this.data.len() {
            return Poll::Ready(None);
        }
        let end = std::cmp::min(this.offset + this.chunk, this.data.len());
        let piece = this.data.slice(this.offset..end);
        this.offset = end;
        if let Some(sink) = &this.progress {
            sink.on_progress(this.offset as u64);
        }
        Poll::Ready(Some(Ok(piece)))
    }
}

/// `reqwest`-based transport. Honors a per-request timeout; cancellation is observed by the
/// streamed body between pieces, matching the streaming-upload idiom the core depends on.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

const STREAM_BUFFER_SIZE: usize = 64 * 1024;

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(
        &self,
        request: PostRequest,
        cancel: &CancellationToken,
    ) -> Result<PostResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }

        builder = match request.body {
            PostBody::Json(value) => builder.json(&value),
            PostBody::Bytes(bytes) => {
                let stream = ProgressBodyStream {
                    data: bytes,
                    offset: 0,
                    chunk: STREAM_BUFFER_SIZE,
                    progress: request.progress,
                    cancel: cancel.clone(),
                };
                builder
                    .header("Content-Type", "application/octet-stream")
                    .body(Body::wrap_stream(stream))
            }
        };

        let send = builder.send();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "engine::transport", "request cancelled before completion");
                Err(TransportError::Cancelled)
            }
            result = send => {
                let response = result?;
                let status = response.status();
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    warn!(target: "engine::transport", %status, "non-success response");
                    return Err(TransportError::Http {
                        status: status.as_u16(),
                        message,
                    });
                }
                let body = response
                    .json::<serde_json::Value>()
                    .await
                    .unwrap_or(serde_json::Value::Null);
                Ok(PostResponse { status: status.as_u16(), body })
            }
        }
    }
}
