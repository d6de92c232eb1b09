//! Bounded-parallel chunk dispatcher: uploads every missing chunk of a `FileMeta` with a
//! fixed cap on concurrently in-flight requests, retrying sub-threshold failures within the
//! same run and only giving up once the error threshold is actually reached.

use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::blob::Blob;
use crate::config::UploadChunksConfig;
use crate::error::{TransportError, UploadError};
use crate::meta::FileMeta;
use crate::slicer::{self, ChunkRange};
use crate::transport::{PostRequest, ProgressSink, Transport};

/// Upper bound on concurrently in-flight chunk uploads. A design constant, not configurable.
pub const MAX_PARALLEL_CHUNKS: usize = 3;

/// Result of one chunk upload attempt.
#[derive(Debug, Clone)]
pub struct ChunkStatus {
    pub range: ChunkRange,
    pub completed: bool,
    pub error: Option<TransportError>,
}

/// Per-chunk byte progress within the current attempt.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress {
    pub index: u32,
    pub loaded: u64,
}

/// Running tally for a single dispatcher run.
#[derive(Debug, Default)]
pub struct DispatcherAccumulator {
    pub completes: HashSet<u32>,
    pub errors: HashSet<u32>,
}

/// Error-count threshold before a run gives up: 3 when there's more than 3 chunks, else 1.
pub fn error_threshold(chunks: u32) -> usize {
    if chunks > 3 { 3 } else { 1 }
}

struct IndexProgressSink {
    index: u32,
    tx: mpsc::UnboundedSender<ChunkProgress>,
}

impl ProgressSink for IndexProgressSink {
    fn on_progress(&self, loaded: u64) {
        let _ = self.tx.send(ChunkProgress {
            index: self.index,
            loaded,
        });
    }
}

/// Uploads missing chunks for one `FileMeta`, tracking lifetime completion separately from
/// per-run bookkeeping so a retry never re-uploads a chunk that already succeeded.
pub struct ChunkDispatcher {
    transport: Arc<dyn Transport>,
    config: Arc<dyn UploadChunksConfig>,
    blob: Arc<dyn Blob>,
    /// Chunk indices that have finished a real HTTP PUT during the engine's lifetime.
    /// Seeded from `file_meta.uploaded_chunks` at construction, grown as chunks complete,
    /// never shrunk.
    completed: Arc<DashSet<u32>>,
}

/// Outcome of a single dispatcher run.
pub enum RunOutcome {
    Finished,
    Failed(UploadError),
    Cancelled,
}

impl ChunkDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<dyn UploadChunksConfig>,
        blob: Arc<dyn Blob>,
        file_meta: &FileMeta,
    ) -> Self {
        let completed = Arc::new(DashSet::new());
        for &index in &file_meta.uploaded_chunks {
            completed.insert(index);
        }
        Self {
            transport,
            config,
            blob,
            completed,
        }
    }

    /// Run one dispatcher pass: upload every chunk not yet in the completion tracker, with at
    /// most [`MAX_PARALLEL_CHUNKS`] in flight. A chunk whose attempt fails is requeued for
    /// another round as long as the error count stays below threshold; the run only gives up
    /// once that threshold is actually reached.
    pub async fn run(
        &self,
        file_meta: &FileMeta,
        cancel: &CancellationToken,
        progress_tx: &mpsc::UnboundedSender<ChunkProgress>,
    ) -> RunOutcome {
        let ranges = slicer::slice(&self.blob, file_meta.chunks, file_meta.chunk_size);
        let mut accumulator = DispatcherAccumulator::default();
        for index in self.completed.iter().map(|r| *r) {
            accumulator.completes.insert(index);
        }

        let threshold = error_threshold(file_meta.chunks);
        let mut pending: Vec<ChunkRange> = ranges
            .into_iter()
            .filter(|r| !self.completed.contains(&r.index))
            .collect();

        if pending.is_empty() || accumulator.completes.len() as u32 == file_meta.chunks {
            return RunOutcome::Finished;
        }

        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_CHUNKS));

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }

            let (status_tx, mut status_rx) = mpsc::unbounded_channel::<ChunkStatus>();
            let mut joinset: JoinSet<()> = JoinSet::new();

            for range in pending.drain(..) {
                let permit_holder = semaphore.clone();
                let transport = self.transport.clone();
                let config = self.config.clone();
                let blob = self.blob.clone();
                let completed = self.completed.clone();
                let file_meta = file_meta.clone();
                let status_tx = status_tx.clone();
                let progress_tx = progress_tx.clone();
                let cancel = cancel.clone();

                joinset.spawn(async move {
                    let _permit = match permit_holder.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    if cancel.is_cancelled() {
                        return;
                    }
                    let status = upload_one_chunk(
                        &*transport,
                        &*config,
                        &*blob,
                        &file_meta,
                        range,
                        &cancel,
                        &progress_tx,
                    )
                    .await;
                    if status.completed {
                        completed.insert(status.range.index);
                    }
                    let _ = status_tx.send(status);
                });
            }
            drop(status_tx);

            let mut retry_next: Vec<ChunkRange> = Vec::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        joinset.shutdown().await;
                        return RunOutcome::Cancelled;
                    }
                    maybe_status = status_rx.recv() => {
                        let Some(status) = maybe_status else { break };
                        if status.completed {
                            accumulator.completes.insert(status.range.index);
                        } else {
                            accumulator.errors.insert(status.range.index);
                            warn!(
                                target: "engine::dispatcher",
                                index = status.range.index,
                                error = ?status.error,
                                errors = accumulator.errors.len(),
                                threshold,
                                "chunk upload failed"
                            );
                            if accumulator.errors.len() >= threshold {
                                accumulator.errors.clear();
                                cancel.cancel();
                                joinset.shutdown().await;
                                return RunOutcome::Failed(UploadError::MultipleChunkUploadError(threshold));
                            }
                            retry_next.push(status.range);
                        }
                    }
                }
            }

            pending = retry_next;
        }

        RunOutcome::Finished
    }
}

async fn upload_one_chunk(
    transport: &dyn Transport,
    config: &dyn UploadChunksConfig,
    blob: &dyn Blob,
    file_meta: &FileMeta,
    range: ChunkRange,
    cancel: &CancellationToken,
    progress_tx: &mpsc::UnboundedSender<ChunkProgress>,
) -> ChunkStatus {
    let bytes = match blob.slice(range.from, range.to).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(target: "engine::dispatcher", index = range.index, error = %e, "failed to read chunk from blob");
            return ChunkStatus {
                range,
                completed: false,
                error: Some(TransportError::Other(e.to_string())),
            };
        }
    };

    let sink: Arc<dyn ProgressSink> = Arc::new(IndexProgressSink {
        index: range.index,
        tx: progress_tx.clone(),
    });

    let url = config.chunk_url(file_meta, range.index);
    let request = PostRequest::bytes(url, bytes)
        .with_headers(config.headers())
        .with_progress(sink);

    debug!(target: "engine::dispatcher", index = range.index, "uploading chunk");
    match transport.post(request, cancel).await {
        Ok(_) => ChunkStatus { range, completed: true, error: None },
        Err(TransportError::Cancelled) => ChunkStatus { range, completed: false, error: None },
        Err(source) => {
            let failure = UploadError::ChunkUploadFailed { index: range.index, source: source.clone() };
            debug!(target: "engine::dispatcher", index = range.index, error = %failure, "chunk transport error");
            ChunkStatus { range, completed: false, error: Some(source) }
        }
    }
}
