//! Shared relay state: the connected-promise, the stored target attachment,
//! and the extension-command correlation table.
//!
//! The correlation table follows the teacher's `cdp::connection` pattern
//! (`HashMap<id, oneshot::Sender<_>>`, monotonically increasing id, drained
//! and failed on socket close) adapted from a single-peer client connection
//! into a bidirectional relay.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

/// The relay's cached record of the tab currently being debugged.
#[derive(Debug, Clone)]
pub struct TargetAttachment {
    pub session_id: String,
    pub target_info: Value,
}

/// Readiness synchronization: resolves once an extension peer is attached,
/// and flips back once it disconnects. Modeled as a level-triggered watch
/// channel rather than a recreated `Notify`/generation pair — same
/// observable semantics (a fresh "promise" each time the extension drops)
/// without races between checking and subscribing.
#[derive(Debug, Clone)]
pub struct ConnectedSignal {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ConnectedSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn mark_connected(&self) {
        let _ = self.tx.send(true);
    }

    pub fn mark_disconnected(&self) {
        let _ = self.tx.send(false);
    }

    pub fn is_connected(&self) -> bool {
        *self.rx.borrow()
    }

    /// Await the next moment the extension is attached. Returns immediately
    /// if already attached.
    pub async fn wait_connected(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|connected| *connected).await;
    }
}

impl Default for ConnectedSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending command sent to the extension, awaiting its correlated reply.
pub type PendingSender = tokio::sync::oneshot::Sender<Result<Value, String>>;

/// State shared by both the `/cdp` and `/extension` socket handlers.
#[derive(Debug)]
pub struct RelayState {
    pub connected: ConnectedSignal,
    pub attachment: RwLock<Option<TargetAttachment>>,
    pub pending: Mutex<HashMap<u64, PendingSender>>,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: ConnectedSignal::new(),
            attachment: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Fail every pending extension command, per invariant I3(b): every id
    /// either resolves or is failed exactly once.
    pub async fn fail_all_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(reason.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connected_signal_resolves_immediately_when_already_connected() {
        let signal = ConnectedSignal::new();
        signal.mark_connected();
        tokio::time::timeout(std::time::Duration::from_millis(50), signal.wait_connected())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn test_connected_signal_blocks_until_marked() {
        let signal = ConnectedSignal::new();
        assert!(!signal.is_connected());

        let signal2 = signal.clone();
        let handle = tokio::spawn(async move {
            signal2.wait_connected().await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        signal.mark_connected();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("wait_connected should resolve after mark_connected")
            .unwrap();
    }

    #[tokio::test]
    async fn test_fail_all_pending_resolves_every_sender() {
        let state = RelayState::new();
        let (tx1, rx1) = tokio::sync::oneshot::channel();
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        state.pending.lock().await.insert(1, tx1);
        state.pending.lock().await.insert(2, tx2);

        state.fail_all_pending("WebSocket closed").await;

        assert_eq!(rx1.await.unwrap().unwrap_err(), "WebSocket closed");
        assert_eq!(rx2.await.unwrap().unwrap_err(), "WebSocket closed");
    }
}
