//! Control-plane signals: start / pause / resume / retry / abort. Abort dominates pause via a
//! parent/child `CancellationToken` pair; every wait loop rechecks `is_aborted()` before and
//! after registering on its notifier, closing the check-then-register race a single check
//! would leave open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

/// Shared control state observed by the orchestration loop. Cloning a handle is cheap; all
/// clones observe the same underlying signals.
#[derive(Clone)]
pub struct ControlPlane {
    /// Dominates every per-run token; cancelling this is terminal.
    abort_token: CancellationToken,
    /// Deduplicated pause/resume flag.
    pause_tx: Arc<watch::Sender<bool>>,
    pause_rx: watch::Receiver<bool>,
    /// Woken whenever `retry()` is called while a retry is awaited.
    retry_notify: Arc<Notify>,
    awaiting_retry: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
    start_notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl ControlPlane {
    pub fn new() -> Self {
        let (pause_tx, pause_rx) = watch::channel(false);
        Self {
            abort_token: CancellationToken::new(),
            pause_tx: Arc::new(pause_tx),
            pause_rx,
            retry_notify: Arc::new(Notify::new()),
            awaiting_retry: Arc::new(AtomicBool::new(false)),
            started: Arc::new(AtomicBool::new(false)),
            start_notify: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A child of the abort token, to be used for a single dispatcher run. Cancelling it
    /// (via `pause()`) doesn't affect sibling runs created after `resume()`.
    pub fn child_token(&self) -> CancellationToken {
        self.abort_token.child_token()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// At-most-once: returns `true` the first time it's called, `false` on every later call.
    pub fn start(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let first = self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.start_notify.notify_one();
        }
        first
    }

    /// Block until `start()` has been called, or return early if aborted first.
    pub async fn wait_for_start(&self) {
        loop {
            if self.started.load(Ordering::SeqCst) || self.is_aborted() {
                return;
            }
            self.start_notify.notified().await;
        }
    }

    pub fn pause(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.pause_tx.send_if_modified(|paused| {
            let changed = !*paused;
            *paused = true;
            changed
        });
    }

    pub fn resume(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.pause_tx.send_if_modified(|paused| {
            let changed = *paused;
            *paused = false;
            changed
        });
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_rx.borrow()
    }

    /// A fresh watch receiver for observing pause/resume transitions.
    pub fn watch_pause(&self) -> watch::Receiver<bool> {
        self.pause_rx.clone()
    }

    /// Wait for the pause flag to flip to `false`. Resolves immediately if already resumed.
    pub async fn wait_for_resume(&self) {
        let mut rx = self.pause_rx.clone();
        loop {
            if !*rx.borrow() || self.is_aborted() {
                return;
            }
            tokio::select! {
                _ = self.abort_token.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Mark a retry as awaited; cleared either by `retry()` firing or by `abort()`.
    pub fn await_retry(&self) {
        self.awaiting_retry.store(true, Ordering::SeqCst);
    }

    /// Ignored unless a retry is currently awaited.
    pub fn retry(&self) {
        if self.is_closed() {
            return;
        }
        if self
            .awaiting_retry
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.retry_notify.notify_one();
        }
    }

    /// Block until either `retry()` clears the awaiting-retry flag or `abort()` fires.
    pub async fn wait_for_retry(&self) {
        loop {
            if self.is_aborted() || !self.awaiting_retry.load(Ordering::SeqCst) {
                return;
            }
            self.retry_notify.notified().await;
        }
    }

    pub fn abort(&self) {
        self.abort_token.cancel();
        self.awaiting_retry.store(false, Ordering::SeqCst);
        self.retry_notify.notify_one();
        self.start_notify.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_token.is_cancelled()
    }

    /// Close the plane: all subsequent control calls become no-ops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}
