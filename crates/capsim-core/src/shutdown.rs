//! Graceful-shutdown signalling.
//!
//! A single token is the sole shutdown primitive: the main loop checks
//! it between events, clock waits race against it, and the repository
//! flusher drains when the engine closes its channel. Built on a
//! [`tokio::sync::watch`] channel so any number of observers can wait
//! without polling.

use tokio::sync::watch;

/// Sending half: triggers shutdown exactly once.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Receiving half: observed by the loop, the clock, and tests.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/token pair.
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownToken { rx })
}

impl ShutdownHandle {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl ShutdownToken {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until shutdown is requested. Returns immediately if it
    /// already was.
    pub async fn triggered(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // The sender lives as long as the engine; a closed channel also
        // means we should stop waiting.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let (handle, mut token) = shutdown_channel();
        assert!(!token.is_triggered());

        let waiter = tokio::spawn(async move {
            token.triggered().await;
            true
        });
        handle.trigger();
        assert!(waiter.await.unwrap_or(false));
        assert!(handle.is_triggered());
    }

    #[tokio::test]
    async fn triggered_returns_immediately_when_already_set() {
        let (handle, mut token) = shutdown_channel();
        handle.trigger();
        // Must not hang.
        token.triggered().await;
        assert!(token.is_triggered());
    }
}
