//! Ordered event stream: a broadcast-channel fan-out of a tagged event enum, one writer and
//! any number of `subscribe()`-ing readers.

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::meta::FileMeta;

/// A single step in the ordered event stream a caller subscribes to.
#[derive(Debug, Clone, Serialize)]
#[allow(clippy::large_enum_variant)]
#[serde(tag = "type", content = "data")]
pub enum UploadEvent<R> {
    Start,
    ChunkStart(FileMeta),
    Progress(f64),
    Pausable(bool),
    Retryable(bool),
    Error(String),
    Finish(R),
}

/// Capacity of the underlying broadcast channel. Generous enough that a slow subscriber
/// doesn't drop events under normal chunk counts; a lagging subscriber still observes a
/// consistent (if gapped) ordering via `BroadcastStream`'s lagged-error semantics.
const CHANNEL_CAPACITY: usize = 256;

/// Fans lifecycle, progress, and control-flag events out to any number of subscribers.
pub struct EventMultiplexer<R> {
    sender: broadcast::Sender<UploadEvent<R>>,
    last_progress: std::sync::atomic::AtomicU64,
}

impl<R: Clone + Send + 'static> EventMultiplexer<R> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            last_progress: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> impl futures::Stream<Item = UploadEvent<R>> + Send
    where
        R: 'static,
    {
        let rx = self.sender.subscribe();
        BroadcastStream::new(rx).filter_map(|item| async move { item.ok() })
    }

    pub fn emit(&self, event: UploadEvent<R>) {
        // A send error just means there are currently no subscribers; that's fine.
        let _ = self.sender.send(event);
    }

    /// Emit a `Progress` event only if `fraction` strictly increases over the last value
    /// emitted, per the monotonicity invariant.
    pub fn emit_progress(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let bits = fraction.to_bits();
        let prev = self.last_progress.load(std::sync::atomic::Ordering::SeqCst);
        if bits > prev {
            self.last_progress.store(bits, std::sync::atomic::Ordering::SeqCst);
            self.emit(UploadEvent::Progress(fraction));
        }
    }
}

impl<R> Default for EventMultiplexer<R>
where
    R: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn progress_only_emits_on_strict_increase() {
        let mux = EventMultiplexer::<serde_json::Value>::new();
        let mut stream = Box::pin(mux.subscribe());

        mux.emit_progress(0.1);
        mux.emit_progress(0.1);
        mux.emit_progress(0.05);
        mux.emit_progress(0.2);

        let first = stream.next().await.unwrap();
        assert!(matches!(first, UploadEvent::Progress(f) if f == 0.1));
        let second = stream.next().await.unwrap();
        assert!(matches!(second, UploadEvent::Progress(f) if f == 0.2));
    }

    #[tokio::test]
    async fn subscribers_see_events_emitted_after_subscription() {
        let mux = EventMultiplexer::<serde_json::Value>::new();
        mux.emit(UploadEvent::Start);
        let mut stream = Box::pin(mux.subscribe());
        mux.emit(UploadEvent::Finish(serde_json::json!({"ok": true})));

        let event = stream.next().await.unwrap();
        assert!(matches!(event, UploadEvent::Finish(_)));
    }
}
