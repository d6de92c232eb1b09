//! End-to-end scenarios against an in-memory mock transport.

use async_trait::async_trait;
use futures::StreamExt;
use resumable_upload_engine::blob::MemoryBlob;
use resumable_upload_engine::config::{StaticUploadConfig, UploadChunksConfig};
use resumable_upload_engine::engine::UploadEngine;
use resumable_upload_engine::error::TransportError;
use resumable_upload_engine::events::UploadEvent;
use resumable_upload_engine::transport::{PostBody, PostRequest, PostResponse, Transport};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Records every chunk request seen and can be configured to fail specific (index, attempt)
/// pairs a fixed number of times.
struct MockTransport {
    chunk_calls: Mutex<Vec<u32>>,
    finish_calls: AtomicUsize,
    start_calls: AtomicUsize,
    uploaded_chunks: Mutex<HashSet<u32>>,
    total_chunks: u32,
    chunk_size: u64,
    file_size: u64,
    /// indices that should fail exactly `fail_times` times before succeeding
    fail_indices: Mutex<std::collections::HashMap<u32, u32>>,
}

impl MockTransport {
    fn new(total_chunks: u32, chunk_size: u64, file_size: u64, pre_uploaded: &[u32]) -> Self {
        Self {
            chunk_calls: Mutex::new(Vec::new()),
            finish_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            uploaded_chunks: Mutex::new(pre_uploaded.iter().copied().collect()),
            total_chunks,
            chunk_size,
            file_size,
            fail_indices: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn fail_times(&self, index: u32, times: u32) {
        self.fail_indices.lock().unwrap().insert(index, times);
    }
}

fn extract_chunk_index(url: &str) -> u32 {
    url.rsplit('/').next().unwrap().parse().unwrap()
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        request: PostRequest,
        _cancel: &CancellationToken,
    ) -> Result<PostResponse, TransportError> {
        if request.url.ends_with("/start") {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            let meta = json!({
                "chunks": self.total_chunks,
                "chunk_size": self.chunk_size,
                "file_size": self.file_size,
                "uploaded_chunks": self.uploaded_chunks.lock().unwrap().clone(),
            });
            return Ok(PostResponse { status: 200, body: meta });
        }
        if request.url.ends_with("/finish") {
            self.finish_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(PostResponse { status: 200, body: json!({"ok": true}) });
        }

        // chunk upload; a small delay gives pause/abort tests room to act mid-flight
        tokio::time::sleep(Duration::from_millis(20)).await;
        let index = extract_chunk_index(&request.url);
        self.chunk_calls.lock().unwrap().push(index);

        let mut fail_map = self.fail_indices.lock().unwrap();
        if let Some(remaining) = fail_map.get_mut(&index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Http { status: 500, message: "injected failure".into() });
            }
        }
        drop(fail_map);

        if let PostBody::Bytes(bytes) = request.body {
            if let Some(sink) = request.progress {
                sink.on_progress(bytes.len() as u64);
            }
        }
        self.uploaded_chunks.lock().unwrap().insert(index);
        Ok(PostResponse { status: 200, body: json!({}) })
    }
}

fn config() -> Arc<StaticUploadConfig> {
    Arc::new(StaticUploadConfig::new(
        "http://mock/start",
        "http://mock/chunk/{index}",
        "http://mock/finish",
    ))
}

async fn collect_events(
    engine: &UploadEngine<serde_json::Value>,
) -> Vec<UploadEvent<serde_json::Value>> {
    let mut stream = Box::pin(engine.subscribe());
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.next()).await {
            Ok(Some(event)) => {
                let is_terminal = matches!(event, UploadEvent::Finish(_));
                events.push(event);
                if is_terminal {
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
    events
}

#[tokio::test]
async fn clean_upload_uploads_every_chunk_once() {
    let transport = Arc::new(MockTransport::new(5, 100, 500, &[]));
    let blob = Arc::new(MemoryBlob::new(vec![0u8; 500]));
    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport.clone(),
        config(),
        blob,
        "file.bin".to_string(),
        None,
    );

    let events = collect_events(&engine).await;
    assert!(matches!(events.last(), Some(UploadEvent::Finish(_))));
    assert_eq!(transport.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.finish_calls.load(Ordering::SeqCst), 1);
    let mut calls = transport.chunk_calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn resumed_upload_skips_already_uploaded_chunks() {
    let transport = Arc::new(MockTransport::new(5, 100, 500, &[0, 2, 4]));
    let blob = Arc::new(MemoryBlob::new(vec![0u8; 500]));
    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport.clone(),
        config(),
        blob,
        "file.bin".to_string(),
        None,
    );

    let events = collect_events(&engine).await;
    assert!(matches!(events.last(), Some(UploadEvent::Finish(_))));
    let mut calls = transport.chunk_calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec![1, 3]);
}

#[tokio::test]
async fn transient_failures_under_threshold_do_not_trip_error() {
    let transport = Arc::new(MockTransport::new(5, 100, 500, &[]));
    transport.fail_times(1, 1);
    transport.fail_times(3, 1);
    let blob = Arc::new(MemoryBlob::new(vec![0u8; 500]));
    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport.clone(),
        config(),
        blob,
        "file.bin".to_string(),
        None,
    );

    let events = collect_events(&engine).await;
    assert!(matches!(events.last(), Some(UploadEvent::Finish(_))));
    assert!(!events.iter().any(|e| matches!(e, UploadEvent::Error(_))));
}

#[tokio::test]
async fn threshold_tripped_then_retry_succeeds() {
    let transport = Arc::new(MockTransport::new(10, 100, 1000, &[]));
    for i in [1u32, 3, 5] {
        transport.fail_times(i, 1);
    }
    let blob = Arc::new(MemoryBlob::new(vec![0u8; 1000]));
    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport.clone(),
        config(),
        blob,
        "file.bin".to_string(),
        None,
    );

    let mut stream = Box::pin(engine.subscribe());
    let mut saw_retryable = false;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended early");
        if matches!(event, UploadEvent::Retryable(true)) {
            saw_retryable = true;
            engine.retry();
        }
        if matches!(event, UploadEvent::Finish(_)) {
            break;
        }
    }
    assert!(saw_retryable);
}

#[tokio::test]
async fn abort_terminates_without_finish() {
    let transport = Arc::new(MockTransport::new(20, 10, 200, &[]));
    let blob = Arc::new(MemoryBlob::new(vec![0u8; 200]));
    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport.clone(),
        config(),
        blob,
        "file.bin".to_string(),
        None,
    );

    let mut stream = Box::pin(engine.subscribe());
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.next()).await;
    engine.abort();

    let mut saw_finish = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), stream.next()).await {
        if matches!(event, UploadEvent::Finish(_)) {
            saw_finish = true;
        }
    }
    assert!(!saw_finish);
    assert_eq!(transport.finish_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pause_then_resume_completes_the_upload() {
    let transport = Arc::new(MockTransport::new(10, 10, 100, &[]));
    let blob = Arc::new(MemoryBlob::new(vec![0u8; 100]));
    let engine = UploadEngine::<serde_json::Value>::spawn(
        transport.clone(),
        config(),
        blob,
        "file.bin".to_string(),
        None,
    );

    let mut stream = Box::pin(engine.subscribe());
    let mut saw_pausable_false = false;
    let mut resumed = false;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended early");
        match event {
            UploadEvent::ChunkStart(_) if !resumed => {
                engine.pause();
            }
            UploadEvent::Pausable(false) => {
                saw_pausable_false = true;
                engine.resume();
                resumed = true;
            }
            UploadEvent::Finish(_) => break,
            _ => {}
        }
    }
    assert!(saw_pausable_false);
}
