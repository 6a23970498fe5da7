//! Cancellation for blocking waits
//!
//! A token is owned by one caller and may be cancelled from any thread. Once
//! cancelled it stays cancelled until the owner resets it, so an interruption
//! is observed by every wait that follows rather than swallowed by the first.

use flume::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of a cancellable wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Waited<T> {
    /// The awaited value arrived.
    Ready(T),
    /// The sending side went away without a value.
    Disconnected,
    /// The token was cancelled before a value arrived.
    Cancelled,
}

struct TokenState {
    cancelled: Mutex<bool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

pub struct CancellationToken {
    inner: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            inner: Arc::new(TokenState {
                cancelled: Mutex::new(false),
                wake_tx,
                wake_rx,
            }),
        }
    }

    /// Cancel the token, waking a blocked waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        let _ = self.inner.wake_tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Clear the cancellation, returning whether it was set.
    pub fn reset(&self) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        let was = *cancelled;
        *cancelled = false;
        while self.inner.wake_rx.try_recv().is_ok() {}
        was
    }

    /// Block until `rx` yields a value, disconnects, or the token is cancelled.
    pub fn wait_on<T>(&self, rx: &Receiver<T>) -> Waited<T> {
        if self.is_cancelled() {
            return Waited::Cancelled;
        }

        flume::Selector::new()
            .recv(rx, |msg| match msg {
                Ok(value) => Waited::Ready(value),
                Err(_) => Waited::Disconnected,
            })
            .recv(&self.inner.wake_rx, |_| Waited::Cancelled)
            .wait()
    }
}

impl Clone for CancellationToken {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
