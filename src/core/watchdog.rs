//! Settlement-window timers keyed by transfer id
//!
//! Each pending transfer gets one tokio task that sleeps for the settlement
//! window and then runs an expiry action. Finalizing or failing the transfer
//! first cancels the timer.
//!
//! # Ordering
//!
//! When a timer fires it removes its own entry *before* running the expiry
//! action. Anything the action does afterwards (including a `cancel` for the
//! same id) therefore never aborts the running expiry. A start handshake
//! makes sure the entry is in the map before the timer can fire.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::types::TransferId;

/// Registry of armed settlement timers
#[derive(Debug, Clone, Default)]
pub struct SettlementWatchdog {
    timers: Arc<DashMap<TransferId, JoinHandle<()>>>,
}

impl SettlementWatchdog {
    /// Create a watchdog with no armed timers
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `transfer_id` that runs `on_expiry` after `window`
    ///
    /// Re-arming an id replaces (and aborts) its previous timer.
    pub fn arm<F, Fut>(&self, transfer_id: TransferId, window: Duration, on_expiry: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let timers = Arc::clone(&self.timers);

        let handle = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(window).await;
            timers.remove(&transfer_id);
            trace!(transfer_id = %transfer_id, "Settlement window elapsed");
            on_expiry().await;
        });

        if let Some(previous) = self.timers.insert(transfer_id, handle) {
            previous.abort();
        }
        let _ = armed_tx.send(());
    }

    /// Cancel the timer for `transfer_id`
    ///
    /// # Returns
    ///
    /// `true` if an armed timer was cancelled, `false` if none was armed
    /// (already fired, already cancelled, or never armed).
    pub fn cancel(&self, transfer_id: TransferId) -> bool {
        match self.timers.remove(&transfer_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// True if a timer is armed for `transfer_id`
    pub fn is_armed(&self, transfer_id: TransferId) -> bool {
        self.timers.contains_key(&transfer_id)
    }

    /// Number of armed timers
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}
