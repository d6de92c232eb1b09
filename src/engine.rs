//! Orchestration loop tying the opener, dispatcher, finisher, control plane and event
//! multiplexer together: open a session, dispatch chunks, and finish, with a loop around the
//! dispatch step so `pause`/`resume` and `retry` can both re-enter it without reopening the
//! session.

use dashmap::DashMap;
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::blob::Blob;
use crate::config::UploadChunksConfig;
use crate::control::ControlPlane;
use crate::dispatcher::{ChunkDispatcher, ChunkProgress, RunOutcome};
use crate::events::{EventMultiplexer, UploadEvent};
use crate::finisher::SessionFinisher;
use crate::meta::OpenSessionRequest;
use crate::opener::SessionOpener;
use crate::transport::Transport;

/// A running upload. Cloning the handle is not supported; instead every control method
/// takes `&self` so a single owned handle can be shared behind an `Arc` if needed.
pub struct UploadEngine<R = serde_json::Value> {
    control: ControlPlane,
    events: Arc<EventMultiplexer<R>>,
}

impl<R> UploadEngine<R>
where
    R: DeserializeOwned + Serialize + Clone + Send + 'static,
{
    /// Construct and spawn the orchestration task for one upload. If `config.auto_start()`
    /// is true (the default), `start()` is called immediately.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        config: Arc<dyn UploadChunksConfig>,
        blob: Arc<dyn Blob>,
        file_name: String,
        last_modified: Option<i64>,
    ) -> Self {
        let control = ControlPlane::new();
        let events = Arc::new(EventMultiplexer::new());
        let auto_start = config.auto_start();

        let task_control = control.clone();
        let task_events = events.clone();
        tokio::spawn(run_pipeline(
            transport,
            config,
            blob,
            file_name,
            last_modified,
            task_control,
            task_events,
        ));

        let engine = Self { control, events };
        if auto_start {
            engine.start();
        }
        engine
    }

    pub fn start(&self) {
        if self.control.start() {
            self.events.emit(UploadEvent::Start);
        }
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn retry(&self) {
        self.control.retry();
    }

    pub fn abort(&self) {
        self.control.abort();
    }

    /// Subscribe to the ordered event stream. Late subscribers only see events emitted
    /// from the point of subscription onward.
    pub fn subscribe(&self) -> impl Stream<Item = UploadEvent<R>> + Send {
        self.events.subscribe()
    }
}

async fn run_pipeline<R>(
    transport: Arc<dyn Transport>,
    config: Arc<dyn UploadChunksConfig>,
    blob: Arc<dyn Blob>,
    file_name: String,
    last_modified: Option<i64>,
    control: ControlPlane,
    events: Arc<EventMultiplexer<R>>,
) where
    R: DeserializeOwned + Serialize + Clone + Send + 'static,
{
    control.wait_for_start().await;
    if control.is_aborted() {
        finish_aborted(&control, &events);
        return;
    }
    events.emit(UploadEvent::Pausable(true));
    events.emit(UploadEvent::Retryable(false));

    let opener = SessionOpener::new(transport.clone(), config.clone());
    let request = OpenSessionRequest {
        file_name,
        file_size: blob.size(),
        last_modified,
    };
    let file_meta = match opener.open(request).await {
        Ok(meta) => meta,
        Err(e) => {
            events.emit(UploadEvent::Error(e.to_string()));
            control.close();
            return;
        }
    };
    events.emit(UploadEvent::ChunkStart(file_meta.clone()));
    info!(target: "engine::engine", chunks = file_meta.chunks, "session ready, dispatching chunks");

    let dispatcher = Arc::new(ChunkDispatcher::new(
        transport.clone(),
        config.clone(),
        blob.clone(),
        &file_meta,
    ));
    let progress_totals: Arc<DashMap<u32, u64>> = Arc::new(DashMap::new());
    let file_size = file_meta.file_size.max(1);

    loop {
        control.wait_for_resume().await;
        if control.is_aborted() {
            finish_aborted(&control, &events);
            return;
        }

        let run_token = control.child_token();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ChunkProgress>();

        let progress_totals_fwd = progress_totals.clone();
        let events_fwd = events.clone();
        let forward = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                progress_totals_fwd.insert(update.index, update.loaded);
                let total: u64 = progress_totals_fwd.iter().map(|e| *e.value()).sum();
                events_fwd.emit_progress(total as f64 / file_size as f64);
            }
        });

        let mut pause_rx = control.watch_pause();
        let watcher_token = run_token.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if *pause_rx.borrow() {
                    watcher_token.cancel();
                    return;
                }
                if pause_rx.changed().await.is_err() {
                    return;
                }
            }
        });

        let outcome = dispatcher.run(&file_meta, &run_token, &progress_tx).await;
        drop(progress_tx);
        let _ = forward.await;
        watcher.abort();

        match outcome {
            RunOutcome::Finished => break,
            RunOutcome::Cancelled => {
                if control.is_aborted() {
                    finish_aborted(&control, &events);
                    return;
                }
                events.emit(UploadEvent::Pausable(false));
                continue;
            }
            RunOutcome::Failed(e) => {
                warn!(target: "engine::engine", error = %e, "dispatcher run failed");
                events.emit(UploadEvent::Error(e.to_string()));
                events.emit(UploadEvent::Retryable(true));
                control.await_retry();
                control.wait_for_retry().await;
                if control.is_aborted() {
                    finish_aborted(&control, &events);
                    return;
                }
                events.emit(UploadEvent::Retryable(false));
                continue;
            }
        }
    }

    events.emit(UploadEvent::Pausable(false));
    let finisher = SessionFinisher::<R>::new(transport, config);
    match finisher.finish(&file_meta).await {
        Ok(response) => events.emit(UploadEvent::Finish(response)),
        Err(e) => events.emit(UploadEvent::Error(e.to_string())),
    }
    events.emit(UploadEvent::Retryable(false));
    control.close();
}

fn finish_aborted<R>(control: &ControlPlane, events: &EventMultiplexer<R>)
where
    R: Clone + Send + 'static,
{
    events.emit(UploadEvent::Pausable(false));
    events.emit(UploadEvent::Retryable(false));
    control.close();
}
